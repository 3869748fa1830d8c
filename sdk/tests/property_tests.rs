use proptest::prelude::*;
use sdk::errors::{EngineError, WardenErrorExt};
use sdk::types::{Action, Profile};
use serde_json::json;

// User hints are static strings; arbitrary error payloads never leak into them.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Database(error_str.clone()),
            EngineError::LLMProvider(error_str.clone()),
            EngineError::Corpus(error_str.clone()),
            EngineError::Dataset(error_str.clone()),
            EngineError::Backup(error_str.clone()),
            EngineError::execution(error_str.clone(), error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 12 {
                prop_assert!(!hint.contains(error_str.as_str()));
            }
        }
    }
}

// Badness score is the plain sum of its parts.
proptest! {
    #[test]
    fn test_badness_score_is_sum(
        dup_rows in 0u64..10_000,
        metrics in proptest::collection::btree_map("[a-z_]{1,16}", 0u64..10_000, 0..6),
    ) {
        let expected = dup_rows + metrics.values().sum::<u64>();
        let profile = Profile {
            dup_rows,
            invalids: metrics,
            ..Default::default()
        };
        prop_assert_eq!(profile.badness_score(), expected);
    }
}

// Every name placed in a column parameter is reported as referenced.
proptest! {
    #[test]
    fn test_referenced_columns_complete(
        column in "[a-z]{1,8}",
        subset in proptest::collection::vec("[a-z]{1,8}", 0..5),
    ) {
        let action = Action::new("FX001", "drop_duplicates", 0.9)
            .with_param("column", json!(column.clone()))
            .with_param("subset", json!(subset.clone()));

        let referenced = action.referenced_columns();
        prop_assert!(referenced.contains(&column));
        for name in &subset {
            prop_assert!(referenced.contains(name));
        }
    }
}
