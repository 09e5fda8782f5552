const DOCUMENTATION: &str = r#"# Planform engine settings. You may edit this file, but be aware that
# formatting and comments will not be preserved. Missing keys take their default value.

# [engine]
# boundary_tolerance = 0.5   # pixels within this distance of an outline belong to it
# stroke_thickness = 3.0     # brush width for stroke elements, in pixels
# background_workers = 2     # threads for deferred refreshes, 0 to refresh on the caller
# [engine.policy]
# min_absolute_pixels = 10   # an object is inside with at least this many overlapping pixels
# min_fraction = 0.01        # ...or at least this share of its own pixels

"#;

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: planform_core::EngineConfig,
    /// Not serialized. Set when the file was missing or unreadable.
    #[serde(skip)]
    failed_to_load: bool,
    /// Not serialized. Set only when there was no file at all.
    #[serde(skip)]
    file_missing: bool,
}
impl Settings {
    const FILENAME: &'static str = "engine.toml";
    /// Settings from user preferences, or defaulted if unavailable for some reason.
    #[must_use]
    pub fn load() -> Self {
        let mut dir = preferences_dir();
        match dir.as_mut() {
            None => Self::no_path(),
            Some(dir) => {
                dir.push(Self::FILENAME);
                Self::load_or_default(dir)
            }
        }
    }
    #[must_use]
    pub fn no_path() -> Self {
        log::warn!("Engine settings weren't available, defaulting.");
        Self {
            failed_to_load: true,
            ..Default::default()
        }
    }
    fn load_or_default(path: &std::path::Path) -> Self {
        let string = match std::fs::read_to_string(path) {
            Ok(string) => string,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No engine settings at {path:?}, defaulting.");
                return Self {
                    failed_to_load: true,
                    file_missing: true,
                    ..Default::default()
                };
            }
            Err(e) => {
                log::warn!("Failed to read {path:?}: {e:#}");
                return Self::no_path();
            }
        };
        match Self::parse(&string) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Failed to parse {path:?}: {e:#}");
                Self::no_path()
            }
        }
    }
    fn parse(string: &str) -> anyhow::Result<Self> {
        try_block::try_block! {
            let settings: Settings = toml::from_str(string)?;
            settings.engine.validate()?;

            Ok(settings)
        }
    }
    /// Return true if loading the user's settings failed.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    /// Return true if there was no settings file. An unreadable file doesn't count, so the
    /// user's edits are never overwritten.
    #[must_use]
    pub fn is_file_missing(&self) -> bool {
        self.file_missing
    }
    pub fn save(&self) -> anyhow::Result<()> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Not recursive. If the parent is missing, the user probably has a reason.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        let mut string = toml::ser::to_string_pretty(self)?;
        string = DOCUMENTATION.to_owned() + &string;
        std::fs::write(preferences, string)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [engine]
            background_workers = 0
            [engine.policy]
            min_absolute_pixels = 4
            "#,
        )
        .unwrap();
        assert_eq!(settings.engine.background_workers, 0);
        assert_eq!(settings.engine.policy.min_absolute_pixels, 4);
        let defaults = planform_core::EngineConfig::default();
        assert_eq!(settings.engine.policy.min_fraction, defaults.policy.min_fraction);
        assert_eq!(settings.engine.stroke_thickness, defaults.stroke_thickness);
    }
    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("planform-{}-{name}.toml", std::process::id()))
    }
    #[test]
    fn missing_file_is_written() {
        let path = scratch_path("missing");
        let _ = std::fs::remove_file(&path);
        let settings = Settings::load_or_default(&path);
        assert!(settings.did_fail_to_load());
        assert!(settings.is_file_missing());
        assert_eq!(settings.engine, planform_core::EngineConfig::default());
    }
    #[test]
    fn broken_file_is_kept() {
        let path = scratch_path("broken");
        let broken = "[engine]\nbackground_workers = \"two\"\n";
        std::fs::write(&path, broken).unwrap();
        let settings = Settings::load_or_default(&path);
        assert!(settings.did_fail_to_load());
        assert!(!settings.is_file_missing());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);

        // Parses, but fails validation.
        std::fs::write(&path, "[engine.policy]\nmin_absolute_pixels = 0\n").unwrap();
        let settings = Settings::load_or_default(&path);
        assert!(settings.did_fail_to_load());
        assert!(!settings.is_file_missing());
        let _ = std::fs::remove_file(&path);
    }
    #[test]
    fn written_file_reads_back() {
        let settings = Settings::default();
        let string = DOCUMENTATION.to_owned() + &toml::ser::to_string_pretty(&settings).unwrap();
        let read: Settings = toml::from_str(&string).unwrap();
        assert_eq!(read.engine, settings.engine);
    }
}
