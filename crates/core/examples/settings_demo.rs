//! Example demonstrating gain settings persistence and presets
//!
//! Run with: cargo run --package clarion-core --example settings_demo

use clarion_core::domain::gain::{EqPreset, GainState};
use clarion_core::domain::settings::GainSettings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("clarion_core=debug,info")
        .init();

    println!("=== Clarion Settings Demo ===\n");

    // 1. Build a gain state and shape it
    println!("1. Configuring gain state...");
    let gain = GainState::new();
    gain.set_input_volume(70);
    gain.set_amplification_factor(6.0);
    gain.set_noise_reduction(true);
    gain.apply_preset(EqPreset::VocalBoost);
    println!(
        "   ✓ amplification {:.1}x, preset {:?}, bands {:?}",
        gain.amplification_factor(),
        gain.active_preset(),
        gain.equalizer_bands()
    );

    // 2. Tweak one band — the preset flips to Custom
    println!("\n2. Editing band 3 directly...");
    gain.set_equalizer_band(3, 9);
    println!(
        "   ✓ preset is now {:?}, bands {:?}",
        gain.active_preset(),
        gain.equalizer_bands()
    );

    // 3. Persist the state
    println!("\n3. Saving settings to file...");
    let settings_path = "demo_settings.toml";
    let settings = GainSettings::capture(&gain);
    settings.save_to_file(settings_path).await?;
    println!("   ✓ Settings saved to {}", settings_path);

    // 4. Restore into a fresh state
    println!("\n4. Loading settings into a fresh state...");
    let loaded = GainSettings::load_from_file(settings_path).await?;
    let restored = GainState::new();
    loaded.apply(&restored);
    println!(
        "   ✓ restored preset {:?}, bands {:?}",
        restored.active_preset(),
        restored.equalizer_bands()
    );

    assert_eq!(restored.equalizer_bands(), gain.equalizer_bands());
    assert_eq!(restored.active_preset(), gain.active_preset());

    // Clean up demo file
    tokio::fs::remove_file(settings_path).await?;
    println!("\n=== Demo complete ===");

    Ok(())
}
