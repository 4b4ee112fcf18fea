//! Example joining two observables owned by separate actors
//!
//! This example shows how to:
//! - Spawn observable actors and publish values into them
//! - Wait for a one-shot join with a timeout
//! - Follow a persistent join while the sources keep changing

use beacon_engine::observable::spawn_observable;
use beacon_engine::observer::{observe, Observer};
use sdk::errors::EngineError;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Observable Join Example ===\n");

    let temperature = spawn_observable::<f64>("temperature");
    let unit = spawn_observable::<String>("unit");

    // Nothing is published yet, so a short wait times out
    let set = (temperature.observable_ref(), unit.observable_ref());
    match observe(set.clone(), Duration::from_millis(100), Ok::<_, EngineError>).await {
        Err(EngineError::ObserveTimeout { pending, .. }) => {
            println!("✓ Timed out, still waiting for {:?}", pending);
        }
        other => println!("Unexpected outcome: {:?}", other.map(|_| ())),
    }

    temperature.update(21.5)?;
    unit.update("C".to_string())?;

    let reading = observe(set.clone(), Duration::from_secs(1), |(t, u)| {
        Ok::<_, EngineError>(format!("{:.1}{}", t, u))
    })
    .await?;
    println!("✓ One-shot join: {}", reading);

    // Persistent join: one result per change while every source is present
    let mut readings = Observer::with_label(set, "readings");
    readings.subscribe().await?;
    if let Some(joined) = readings.next().await {
        let (t, u) = joined?;
        println!("  current: {:.1}{}", t, u);
    }

    for value in [22.0, 22.5, 23.0] {
        temperature.update(value)?;
        if let Some(joined) = readings.next().await {
            let (t, u) = joined?;
            println!("  changed: {:.1}{}", t, u);
        }
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
