//! Show the effective configuration.

use locman::config::{config_file_path, ConfigFile};

use crate::error::CliError;
use crate::runner::GlobalArgs;

pub fn run(global: &GlobalArgs<'_>) -> Result<(), CliError> {
    let path = global
        .config
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&path)?;
    let manager = &config.manager;

    println!("Config file: {}", path.display());
    if !path.exists() {
        println!("  (not found, using defaults)");
    }
    println!();
    println!("[cache]");
    println!("  precision_meters       = {}", manager.cache_precision_meters);
    match &config.cache_path {
        Some(p) => println!("  path                   = {}", p.display()),
        None => println!("  path                   = (memory)"),
    }
    println!("[resolver]");
    println!(
        "  min_interval_secs      = {}",
        manager.min_resolution_interval.as_secs_f64()
    );
    println!("  throttle_policy        = {}", manager.throttle_policy);
    println!("[listener]");
    println!("  ttl_secs               = {}", manager.listener_ttl.as_secs_f64());
    println!("[tracking]");
    println!("  follow_address         = {}", manager.follow_address);
    println!("  follow_distance_meters = {}", manager.follow_distance_meters);
    println!("[logging]");
    println!("  directory              = {}", config.log_directory.display());
    println!("  file                   = {}", config.log_file);

    Ok(())
}
