//! Modes command - list render modes

use stereoglyph_core::render::RenderMode;

/// Print every render mode in hotkey cycle order
pub fn modes() {
    println!("Stereoglyph - Render Modes\n");
    println!("{:<14} {:<20}", "Token", "Name");
    println!("{}", "-".repeat(34));

    let default = RenderMode::default();
    for mode in RenderMode::ALL {
        let marker = if mode == default { " (default)" } else { "" };
        println!("{:<14} {}{}", mode.token(), mode.display_name(), marker);
    }

    println!("\nThe cycle-mode hotkey advances through this list and wraps.");
}
