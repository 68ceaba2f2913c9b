//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置检查命令的实现。

use crate::cli::CheckConfigArgs;
use crate::config::Config;
use anyhow::{Context, Result};

pub fn execute(args: &CheckConfigArgs) -> Result<()> {
    let config = Config::from_file(&args.path)
        .with_context(|| format!("Invalid configuration: {}", args.path.display()))?;

    println!("=== {} ===\n", args.path.display());
    println!("Default TTL:   {}s", config.global.default_ttl);
    println!("Serialization: {:?}", config.global.serialization);
    println!("Memory:        max_capacity={}", config.memory.max_capacity);
    match &config.redis {
        Some(redis) => println!(
            "Redis:         topic={}",
            redis.topic.as_deref().unwrap_or("<none>")
        ),
        None => println!("Redis:         <not configured>"),
    }

    let mut names: Vec<_> = config.groups.keys().collect();
    names.sort();
    println!("\nGroups ({}):", names.len());
    for name in names {
        let settings = config.group(name);
        let group_config = settings.group_config(&config.global);
        println!(
            "  {:<20} store={:?} ttl={:?} cost={:?} single_flight={} distributed={}",
            name,
            settings.store,
            group_config.ttl,
            group_config.cost,
            settings.single_flight(&config.global),
            settings.distributed
        );
    }
    println!("\nOK");
    Ok(())
}
