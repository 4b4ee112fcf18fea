use proptest::prelude::*;
use sdk::errors::{EngineError, EngineErrorExt};
use std::time::Duration;

// Error user hints are static and never echo the observable name or value
// carried by the error.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-z]{12,24}") {
        let errs = vec![
            EngineError::InvalidValue(error_str.clone()),
            EngineError::ObservableUnavailable(error_str.clone()),
            EngineError::MailboxClosed(error_str.clone()),
            EngineError::ActorFailed(error_str.clone()),
            EngineError::Config(error_str.clone()),
            EngineError::Launcher(error_str.clone()),
            EngineError::ObserveTimeout {
                timeout: Duration::from_millis(10),
                pending: vec![error_str.clone()],
            },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }
}
