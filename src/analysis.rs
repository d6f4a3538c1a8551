//! Localization accuracy metrics for free-field sound localization tests.
//!
//! A localization test presents stimuli from fixed speakers and records the
//! direction the listener pointed to. This module turns such a trial sequence
//! into a [`TrialTable`] and computes the usual accuracy measures over it:
//!
//! - [`mean_dir`]: mean response direction for one speaker
//! - [`mad`]: mean absolute deviation of responses from a reference direction
//! - [`rmse`]: root mean square of the same deviations
//! - [`eg`]: elevation gain, the slope of perceived versus physical elevation
//!
//! Metrics over an empty selection return `NaN`, the same value an empty
//! floating point mean has. Callers that need to distinguish "no data" should
//! check [`TrialTable::rows_for`] first.

use crate::{
    constants::{EG_LOWER_PERCENTILE, EG_UPPER_PERCENTILE},
    Error, Result,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// One condition of a trial sequence: a speaker and its nominal direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Speaker id, a row index into [`SpeakerPositions`]
    pub speaker: usize,
    /// Target azimuth in degrees
    pub azi: f64,
    /// Target elevation in degrees
    pub ele: f64,
}

/// Trial sequence as produced by the localization test runner
///
/// `trials` holds 1-based condition numbers in presentation order and
/// `data[i]` is the `(azimuth, elevation)` response recorded for `trials[i]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialSequence {
    /// Conditions that can be presented
    pub conditions: Vec<Target>,
    /// Presented condition numbers, starting at 1
    pub trials: Vec<usize>,
    /// Responses, one per presented trial
    pub data: Vec<(f64, f64)>,
}

/// Target and response coordinates of a single trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Speaker that presented the stimulus
    pub speaker: usize,
    /// Target azimuth in degrees
    pub azi_target: f64,
    /// Target elevation in degrees
    pub ele_target: f64,
    /// Response azimuth in degrees
    pub azi_response: f64,
    /// Response elevation in degrees
    pub ele_response: f64,
}

impl TrialRecord {
    /// Response coordinates as a direction
    #[must_use]
    pub fn response(&self) -> Direction {
        Direction::new(self.azi_response, self.ele_response)
    }
}

/// Azimuth/elevation pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    /// Horizontal angle in degrees
    pub azimuth: f64,
    /// Vertical angle in degrees
    pub elevation: f64,
}

impl Direction {
    /// Create a direction from azimuth and elevation in degrees
    #[must_use]
    pub const fn new(azimuth: f64, elevation: f64) -> Self {
        Self { azimuth, elevation }
    }

    /// Euclidean distance in (azimuth, elevation) space
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        let d_azi = self.azimuth - other.azimuth;
        let d_ele = self.elevation - other.elevation;
        (d_azi.powi(2) + d_ele.powi(2)).sqrt()
    }

    /// Whether either component is `NaN`
    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.azimuth.is_nan() || self.elevation.is_nan()
    }
}

/// Ordered table of trial records, one row per trial in presentation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialTable {
    rows: Vec<TrialRecord>,
}

impl TrialTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from already extracted records
    #[must_use]
    pub fn from_records(rows: Vec<TrialRecord>) -> Self {
        Self { rows }
    }

    /// Extract target and response coordinates from a trial sequence
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequence`] if:
    /// - The number of responses differs from the number of trials
    /// - A trial number is 0 or exceeds the number of conditions
    pub fn from_sequence(sequence: &TrialSequence) -> Result<Self> {
        if sequence.trials.len() != sequence.data.len() {
            return Err(Error::InvalidSequence(format!(
                "{} trials but {} responses",
                sequence.trials.len(),
                sequence.data.len()
            )));
        }

        let mut rows = Vec::with_capacity(sequence.trials.len());
        for (&trial, &(azi_response, ele_response)) in sequence.trials.iter().zip(&sequence.data) {
            let target = trial
                .checked_sub(1)
                .and_then(|idx| sequence.conditions.get(idx))
                .ok_or_else(|| {
                    Error::InvalidSequence(format!(
                        "trial {trial} does not name one of {} conditions",
                        sequence.conditions.len()
                    ))
                })?;
            rows.push(TrialRecord {
                speaker: target.speaker,
                azi_target: target.azi,
                ele_target: target.ele,
                azi_response,
                ele_response,
            });
        }

        log::debug!("Extracted {} trials from sequence", rows.len());
        Ok(Self { rows })
    }

    /// Append a record
    pub fn push(&mut self, record: TrialRecord) {
        self.rows.push(record);
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows in trial order
    pub fn iter(&self) -> impl Iterator<Item = &TrialRecord> {
        self.rows.iter()
    }

    /// Rows presented by `speaker`, in trial order
    pub fn rows_for(&self, speaker: usize) -> impl Iterator<Item = &TrialRecord> {
        self.rows.iter().filter(move |row| row.speaker == speaker)
    }

    /// Distinct speaker ids in order of first appearance
    #[must_use]
    pub fn speakers(&self) -> Vec<usize> {
        let mut speakers = Vec::new();
        for row in &self.rows {
            if !speakers.contains(&row.speaker) {
                speakers.push(row.speaker);
            }
        }
        speakers
    }
}

impl FromIterator<TrialRecord> for TrialTable {
    fn from_iter<I: IntoIterator<Item = TrialRecord>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Physical speaker positions indexed `[speaker, {0 = azimuth, 1 = elevation}]`
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerPositions {
    table: Array2<f64>,
}

impl SpeakerPositions {
    /// Wrap a position array
    ///
    /// # Errors
    ///
    /// Returns an error if the array has fewer than two columns
    pub fn new(table: Array2<f64>) -> Result<Self> {
        if table.ncols() < 2 {
            return Err(Error::InvalidInput(format!(
                "Speaker table needs azimuth and elevation columns, got {}",
                table.ncols()
            )));
        }
        Ok(Self { table })
    }

    /// Build a position table from `(azimuth, elevation)` rows
    #[must_use]
    pub fn from_rows(rows: &[(f64, f64)]) -> Self {
        let mut table = Array2::zeros((rows.len(), 2));
        for (idx, &(azimuth, elevation)) in rows.iter().enumerate() {
            table[[idx, 0]] = azimuth;
            table[[idx, 1]] = elevation;
        }
        Self { table }
    }

    /// Number of speakers
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.nrows()
    }

    /// Whether the table has no speakers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.nrows() == 0
    }

    /// Physical direction of `speaker`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpeakerOutOfRange`] if `speaker` is not a row of the table
    pub fn position(&self, speaker: usize) -> Result<Direction> {
        if speaker >= self.table.nrows() {
            return Err(Error::SpeakerOutOfRange {
                speaker,
                count: self.table.nrows(),
            });
        }
        Ok(Direction::new(self.table[[speaker, 0]], self.table[[speaker, 1]]))
    }
}

/// Mean response direction of all trials presented by `speaker`
///
/// Both components are `NaN` when no trial matches.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Trial counts are small
pub fn mean_dir(table: &TrialTable, speaker: usize) -> Direction {
    let (count, azi_sum, ele_sum) = table
        .rows_for(speaker)
        .fold((0usize, 0.0, 0.0), |(n, azi, ele), row| {
            (n + 1, azi + row.azi_response, ele + row.ele_response)
        });
    if count == 0 {
        return Direction::new(f64::NAN, f64::NAN);
    }
    Direction::new(azi_sum / count as f64, ele_sum / count as f64)
}

/// Per-trial Euclidean distances between responses of `speaker` and a reference
fn deviations(table: &TrialTable, speaker: usize, ref_dir: Option<Direction>) -> Vec<f64> {
    let reference = ref_dir.unwrap_or_else(|| mean_dir(table, speaker));
    table
        .rows_for(speaker)
        .map(|row| row.response().distance(&reference))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean absolute deviation of the responses of `speaker` from `ref_dir`
///
/// The reference defaults to [`mean_dir`] of the same speaker. Returns `NaN`
/// when no trial matches.
#[must_use]
pub fn mad(table: &TrialTable, speaker: usize, ref_dir: Option<Direction>) -> f64 {
    mean(&deviations(table, speaker, ref_dir))
}

/// Root mean square deviation of the responses of `speaker` from `ref_dir`
///
/// Uses the same per-trial distances as [`mad`] but averages their squares.
/// Returns `NaN` when no trial matches.
#[must_use]
pub fn rmse(table: &TrialTable, speaker: usize, ref_dir: Option<Direction>) -> f64 {
    let squared: Vec<f64> = deviations(table, speaker, ref_dir)
        .into_iter()
        .map(|d| d.powi(2))
        .collect();
    mean(&squared).sqrt()
}

/// Elevation gain of the whole table
///
/// Without `speaker_positions` this is the interquartile range of the response
/// elevations. With positions it is the least squares slope of response
/// elevation against the physical elevation of the presented speaker: 1 means
/// perfect localization, 0 means responses independent of elevation.
///
/// Returns `NaN` for an empty table, and in regression mode for fewer than
/// two trials or when all trials share one physical elevation.
///
/// # Errors
///
/// Returns [`Error::SpeakerOutOfRange`] if a trial names a speaker missing from
/// `speaker_positions`
pub fn eg(table: &TrialTable, speaker_positions: Option<&SpeakerPositions>) -> Result<f64> {
    let responses: Vec<f64> = table.iter().map(|row| row.ele_response).collect();

    let Some(positions) = speaker_positions else {
        let mut sorted = responses;
        sorted.sort_by(f64::total_cmp);
        return Ok(percentile(&sorted, EG_UPPER_PERCENTILE) - percentile(&sorted, EG_LOWER_PERCENTILE));
    };

    let physical = table
        .iter()
        .map(|row| positions.position(row.speaker).map(|p| p.elevation))
        .collect::<Result<Vec<f64>>>()?;

    Ok(regression_slope(&physical, &responses))
}

/// Percentile of sorted data with linear interpolation between closest ranks
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Ordinary least squares slope of `y` against `x`
fn regression_slope(x: &[f64], y: &[f64]) -> f64 {
    if x.len() < 2 || x.len() != y.len() {
        return f64::NAN;
    }
    let mean_x = mean(x);
    let mean_y = mean(y);
    let (sxx, sxy) = x.iter().zip(y).fold((0.0, 0.0), |(sxx, sxy), (&xi, &yi)| {
        let dx = xi - mean_x;
        (sxx + dx * dx, sxy + dx * (yi - mean_y))
    });
    if sxx == 0.0 {
        return f64::NAN;
    }
    sxy / sxx
}

/// Accuracy measures of one speaker
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeakerSummary {
    /// Speaker id
    pub speaker: usize,
    /// Number of trials presented by this speaker
    pub trials: usize,
    /// Mean response direction
    pub mean_direction: Direction,
    /// Mean absolute deviation from the mean direction
    pub mad: f64,
    /// Root mean square deviation from the mean direction
    pub rmse: f64,
}

/// Accuracy measures of a whole localization test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizationSummary {
    /// Per-speaker measures in order of first presentation
    pub speakers: Vec<SpeakerSummary>,
    /// Elevation gain over all trials
    pub elevation_gain: f64,
}

/// Compute every metric for every speaker in the table
///
/// # Errors
///
/// Returns an error if [`eg`] fails for the given position table
pub fn summarize(table: &TrialTable, speaker_positions: Option<&SpeakerPositions>) -> Result<LocalizationSummary> {
    let speakers = table
        .speakers()
        .into_iter()
        .map(|speaker| {
            let mean_direction = mean_dir(table, speaker);
            SpeakerSummary {
                speaker,
                trials: table.rows_for(speaker).count(),
                mean_direction,
                mad: mad(table, speaker, Some(mean_direction)),
                rmse: rmse(table, speaker, Some(mean_direction)),
            }
        })
        .collect();

    Ok(LocalizationSummary {
        speakers,
        elevation_gain: eg(table, speaker_positions)?,
    })
}
