//! Layers `PodsyncConfig` the way `narayana-server` layers its own config:
//! built-in defaults, then an optional file, then `PODSYNC_*` environment
//! overrides.

use podsync_core::PodsyncConfig;

pub fn load(config_path: Option<&str>) -> anyhow::Result<PodsyncConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("PODSYNC").separator("__"));
    let built = builder.build()?;
    let config: PodsyncConfig = built.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
