//! Injects Wi-Fi credentials and backend settings from `.env` at compile time
//! and sets up the ESP linker scripts.

/// Keys that must be present in `.env` or the build environment
const REQUIRED: [&str; 3] = ["WIFI_SSID", "WIFI_PASSWORD", "BACKEND_HOST"];

/// Optional keys with their fallback values
const OPTIONAL: [(&str, &str); 3] = [
    ("BACKEND_PORT", "80"),
    ("BACKEND_PATH", "/api/mutation"),
    ("NTP_SERVER", "pool.ntp.org"),
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=No .env loaded ({e}); using the build environment");
    }

    for key in REQUIRED {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => panic!("{key} must be set in .env or the environment"),
        }
    }

    for (key, fallback) in OPTIONAL {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_else(|_| fallback.to_string());
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
