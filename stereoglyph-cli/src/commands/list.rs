//! List devices command

use anyhow::{Context, Result};
use stereoglyph_core::capture;

/// List V4L2 video nodes
pub fn list_devices() -> Result<()> {
    println!("Stereoglyph - Video Devices\n");

    let devices = capture::list_devices().context("Failed to scan /dev")?;

    if devices.is_empty() {
        println!("No video devices found.");
        println!("\nUse stub://left and stub://right to run with synthetic cameras.");
        return Ok(());
    }

    println!(
        "{:<14} {:<30} {:<12} {:<8}",
        "Device", "Card", "Driver", "Usable"
    );
    println!("{}", "-".repeat(66));

    for device in devices {
        println!(
            "{:<14} {:<30} {:<12} {}",
            device.path,
            truncate(&device.card, 28),
            truncate(&device.driver, 10),
            if device.is_usable() { "yes" } else { "no" }
        );
    }

    println!("\nNote: cameras often expose a second metadata node; only nodes marked");
    println!("usable support capture with streaming I/O.");

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    }
}
