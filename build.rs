// build.rs

use std::env;

const SEED_VARS: [&str; 6] = [
    "WIFI_SSID",
    "WIFI_PASS",
    "API_KEY",
    "CHANNEL_ID",
    "DISPLAY_TEXT",
    "API_PORT",
];

fn main() -> anyhow::Result<()> {
    // Necessary because of this issue: https://github.com/rust-lang/cargo/issues/9641
    // see also https://github.com/rust-lang/cargo/issues/9554
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::build::CfgArgs::output_propagated("ESP_IDF")?;
        embuild::build::LinkArgs::output_propagated("ESP_IDF")?;
    }

    // only forward what is actually set, the firmware defaults are empty
    for var in SEED_VARS {
        println!("cargo:rerun-if-env-changed={var}");
        if let Ok(value) = env::var(var) {
            println!("cargo:rustc-env={var}={value}");
        }
    }

    Ok(())
}

// EOF
