use bevy_log::info;
use hydro_shared::{HydroConfig, HydroPreset};
use ron::de::from_str;
use std::fs;
use std::path::Path;

/// Loads a hydrology config from a `.ron` file, or the preset when no path
/// is given. Fields missing from the file keep their defaults.
pub fn load_hydro_config(
    path: Option<&Path>,
    preset: HydroPreset,
) -> Result<HydroConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        info!("No config file given, using the {:?} preset", preset);
        return Ok(preset.to_config());
    };

    let contents: String = fs::read_to_string(path)?;
    let config: HydroConfig = from_str(&contents)?;

    info!("Loaded hydrology config from {}", path.display());

    Ok(config.sanitized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_preset_without_file() {
        let config = load_hydro_config(None, HydroPreset::Arid).unwrap();
        assert_eq!(
            config.evaporation_rate,
            HydroPreset::Arid.to_config().evaporation_rate
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = std::env::temp_dir().join(format!("hydro_config_{}.ron", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"(flow_rate: 2.5, edge_mode: Sink(level: -1.0))")
            .unwrap();
        drop(file);

        let config = load_hydro_config(Some(&path), HydroPreset::Default).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.flow_rate, 2.5);
        assert_eq!(config.edge_mode, hydro_shared::EdgeMode::Sink { level: -1.0 });
        assert_eq!(config.substep, HydroConfig::default().substep);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = Path::new("/nonexistent/hydro.ron");
        assert!(load_hydro_config(Some(path), HydroPreset::Default).is_err());
    }
}
