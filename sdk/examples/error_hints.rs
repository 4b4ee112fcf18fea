//! Example demonstrating EngineError hints and identity types

use sdk::{EngineError, EngineErrorExt, ObservableId};
use std::time::Duration;

fn main() {
    // Example 1: Every error carries a hint and a recoverability flag
    let errors = vec![
        EngineError::InvalidValue("node_info".to_string()),
        EngineError::ObserveTimeout {
            timeout: Duration::from_secs(30),
            pending: vec!["overlay".to_string(), "service".to_string()],
        },
        EngineError::ObservableUnavailable("service".to_string()),
        EngineError::Launcher("container runtime unavailable".to_string()),
    ];

    for error in &errors {
        println!("Error: {}", error);
        println!("  hint: {}", error.user_hint());
        println!("  recoverable: {}", error.is_recoverable());
    }

    // Example 2: IO errors convert with `?`
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml");
    let converted: EngineError = io.into();
    println!("\nConverted: {}", converted);

    // Example 3: Observable ids are never reused
    let first = ObservableId::next();
    let second = ObservableId::next();
    println!("\nAllocated {} and {}", first, second);
    assert_ne!(first, second);
}
