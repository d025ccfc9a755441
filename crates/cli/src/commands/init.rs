//! `introute init` — First-time setup.

use introute_config::EngineConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = EngineConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("introute — first-time setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("Edit it manually or delete and re-run init.");
    } else {
        std::fs::write(&config_path, EngineConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("  1. Set an API key: export INTROUTE_API_KEY=...");
        println!("  2. Import a template: introute template import --file template.json");
        println!("  3. Try it: introute resolve -t <template_id> -u \"book an appointment\"");
    }

    Ok(())
}
