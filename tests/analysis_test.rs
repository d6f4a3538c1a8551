//! Localization metric tests against hand computed values


use freefield_toolbox::{
    analysis::{eg, mad, mean_dir, rmse, summarize, Direction, SpeakerPositions, Target, TrialSequence, TrialTable},
    Error,
};
use test_helpers::response;

const TOLERANCE: f64 = 1e-9;

fn two_speaker_sequence() -> TrialSequence {
    TrialSequence {
        conditions: vec![
            Target { speaker: 0, azi: -17.5, ele: 0.0 },
            Target { speaker: 1, azi: 17.5, ele: 12.5 },
        ],
        trials: vec![2, 1, 2],
        data: vec![(15.0, 10.0), (-20.0, 2.0), (19.0, 14.0)],
    }
}

#[test]
fn test_table_rows_follow_trial_order() {
    let table = TrialTable::from_sequence(&two_speaker_sequence()).unwrap();
    let rows: Vec<_> = table.iter().copied().collect();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].speaker, 1);
    assert_eq!(rows[0].azi_target, 17.5);
    assert_eq!(rows[0].ele_target, 12.5);
    assert_eq!(rows[0].azi_response, 15.0);
    assert_eq!(rows[0].ele_response, 10.0);
    assert_eq!(rows[1].speaker, 0);
    assert_eq!(rows[2].azi_response, 19.0);
}

#[test]
fn test_sequence_shape_errors() {
    let mut mismatched = two_speaker_sequence();
    mismatched.data.pop();
    assert!(matches!(TrialTable::from_sequence(&mismatched), Err(Error::InvalidSequence(_))));

    let mut zero_trial = two_speaker_sequence();
    zero_trial.trials[0] = 0;
    assert!(matches!(TrialTable::from_sequence(&zero_trial), Err(Error::InvalidSequence(_))));

    let mut unknown_condition = two_speaker_sequence();
    unknown_condition.trials[2] = 3;
    assert!(matches!(TrialTable::from_sequence(&unknown_condition), Err(Error::InvalidSequence(_))));
}

#[test]
fn test_mean_dir_single_trial_is_that_response() {
    let table = TrialTable::from_sequence(&two_speaker_sequence()).unwrap();
    assert_eq!(mean_dir(&table, 0), Direction::new(-20.0, 2.0));
}

#[test]
fn test_mean_dir_averages_matching_rows() {
    let table = TrialTable::from_sequence(&two_speaker_sequence()).unwrap();
    let direction = mean_dir(&table, 1);
    assert!((direction.azimuth - 17.0).abs() < TOLERANCE);
    assert!((direction.elevation - 12.0).abs() < TOLERANCE);
}

#[test]
fn test_mean_dir_without_matches_is_nan() {
    let table = TrialTable::from_sequence(&two_speaker_sequence()).unwrap();
    assert!(mean_dir(&table, 7).is_nan());
    assert!(mad(&table, 7, None).is_nan());
    assert!(rmse(&table, 7, None).is_nan());
}

#[test]
fn test_mad_and_rmse_hand_computed() {
    // Distances 0, 0, 3 and 4 from the origin
    let table = TrialTable::from_records(vec![
        response(2, 0.0, 0.0),
        response(2, 0.0, 0.0),
        response(2, 3.0, 0.0),
        response(2, 0.0, 4.0),
        response(5, 100.0, 100.0),
    ]);
    let origin = Some(Direction::new(0.0, 0.0));

    assert!((mad(&table, 2, origin) - 1.75).abs() < TOLERANCE);
    assert!((rmse(&table, 2, origin) - 2.5).abs() < TOLERANCE);
}

#[test]
fn test_mad_uses_diagonal_distance() {
    let table = TrialTable::from_records(vec![response(0, 3.0, 4.0)]);
    assert!((mad(&table, 0, Some(Direction::new(0.0, 0.0))) - 5.0).abs() < TOLERANCE);
    // Default reference is the response itself
    assert_eq!(mad(&table, 0, None), 0.0);
}

#[test]
fn test_rmse_not_below_mad() {
    let table = TrialTable::from_records(vec![
        response(1, 10.0, 0.0),
        response(1, -4.0, 3.0),
        response(1, 1.0, -7.0),
        response(1, 0.5, 0.5),
    ]);
    assert!(rmse(&table, 1, None) >= mad(&table, 1, None));
}

#[test]
fn test_eg_interquartile_range() {
    let table: TrialTable = [10.0, 20.0, 30.0, 40.0, 50.0]
        .into_iter()
        .map(|ele| response(0, 0.0, ele))
        .collect();
    assert!((eg(&table, None).unwrap() - 20.0).abs() < TOLERANCE);
}

#[test]
fn test_eg_identity_mapping_has_unit_gain() {
    let positions = SpeakerPositions::from_rows(&[(0.0, -37.5), (0.0, -12.5), (0.0, 12.5), (0.0, 37.5)]);
    let table: TrialTable = [0usize, 1, 2, 3, 2, 1, 0, 3]
        .into_iter()
        .map(|speaker| {
            let ele = positions.position(speaker).unwrap().elevation;
            response(speaker, 0.0, ele)
        })
        .collect();

    assert!((eg(&table, Some(&positions)).unwrap() - 1.0).abs() < TOLERANCE);
}

#[test]
fn test_eg_constant_responses_have_zero_gain() {
    let positions = SpeakerPositions::from_rows(&[(0.0, -25.0), (0.0, 0.0), (0.0, 25.0)]);
    let table = TrialTable::from_records(vec![
        response(0, 0.0, 5.0),
        response(1, 0.0, 5.0),
        response(2, 0.0, 5.0),
    ]);
    assert!(eg(&table, Some(&positions)).unwrap().abs() < TOLERANCE);
}

#[test]
fn test_eg_half_gain() {
    let positions = SpeakerPositions::from_rows(&[(0.0, -20.0), (0.0, 0.0), (0.0, 20.0)]);
    let table = TrialTable::from_records(vec![
        response(0, 0.0, -10.0),
        response(1, 0.0, 0.0),
        response(2, 0.0, 10.0),
    ]);
    assert!((eg(&table, Some(&positions)).unwrap() - 0.5).abs() < TOLERANCE);
}

#[test]
fn test_eg_unknown_speaker_is_error() {
    let positions = SpeakerPositions::from_rows(&[(0.0, 0.0)]);
    let table = TrialTable::from_records(vec![response(0, 0.0, 0.0), response(4, 0.0, 1.0)]);

    match eg(&table, Some(&positions)) {
        Err(Error::SpeakerOutOfRange { speaker, count }) => {
            assert_eq!(speaker, 4);
            assert_eq!(count, 1);
        }
        other => panic!("Expected SpeakerOutOfRange, got {other:?}"),
    }
}

#[test]
fn test_eg_degenerate_inputs_are_nan() {
    assert!(eg(&TrialTable::new(), None).unwrap().is_nan());

    let positions = SpeakerPositions::from_rows(&[(0.0, 10.0), (30.0, 10.0)]);
    let table = TrialTable::from_records(vec![response(0, 0.0, 3.0), response(1, 0.0, 9.0)]);
    assert!(eg(&table, Some(&positions)).unwrap().is_nan());
}

#[test]
fn test_summary_of_sequence() {
    let table = TrialTable::from_sequence(&two_speaker_sequence()).unwrap();
    let summary = summarize(&table, None).unwrap();

    let speakers: Vec<usize> = summary.speakers.iter().map(|s| s.speaker).collect();
    assert_eq!(speakers, vec![1, 0]);
    assert_eq!(summary.speakers[0].trials, 2);
    assert!(summary.speakers[0].rmse >= summary.speakers[0].mad);
    assert!((summary.elevation_gain - eg(&table, None).unwrap()).abs() < TOLERANCE);
}
