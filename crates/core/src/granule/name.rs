use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex_lite::Regex;
use thiserror::Error;

/// Errors produced when a file name falls outside the granule grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GranuleNameError {
    #[error("{name}: missing file extension")]
    MissingExtension { name: String },

    #[error("{name}: empty name component")]
    EmptyComponent { name: String },

    #[error("{name}: platform must be MISSION_SENSOR, got '{platform}'")]
    BadPlatform { name: String, platform: String },

    #[error("{name}: invalid date field '{value}'")]
    BadDate { name: String, value: String },

    #[error("{name}: unknown processing level '{level}'")]
    UnknownLevel { name: String, level: String },

    #[error("unknown mission code '{code}'")]
    UnknownMission { code: String },

    #[error("{name}: level {level} expects {expected} components, found {found}")]
    ComponentCount {
        name: String,
        level: Level,
        expected: usize,
        found: usize,
    },
}

/// Processing level of a granule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Raw level-2 swath (a Product).
    L2,
    /// Binned level-3 intermediate.
    L3Binned,
    /// Mapped level-3 grid (a Derivative).
    L3Mapped,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::L2 => "L2",
            Level::L3Binned => "L3b",
            Level::L3Mapped => "L3m",
        }
    }

    fn component_count(&self) -> usize {
        match self {
            Level::L2 => 4,
            Level::L3Binned | Level::L3Mapped => 6,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed granule file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranuleName {
    file_name: String,
    mission: String,
    sensor: String,
    date: NaiveDate,
    time: Option<String>,
    level: Level,
    period: Option<String>,
    suite: String,
    resolution: Option<String>,
    extension: String,
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{8})(?:T(\d{6}))?$").expect("date pattern is a valid regex")
    })
}

impl GranuleName {
    /// Parse a bare file name (no directory part).
    pub fn parse(file_name: &str) -> Result<Self, GranuleNameError> {
        let name = || file_name.to_string();

        let (stem, extension) = file_name
            .rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .ok_or_else(|| GranuleNameError::MissingExtension { name: name() })?;

        let components: Vec<&str> = stem.split('.').collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(GranuleNameError::EmptyComponent { name: name() });
        }
        if components.len() < 3 {
            return Err(GranuleNameError::ComponentCount {
                name: name(),
                level: Level::L2,
                expected: Level::L2.component_count(),
                found: components.len(),
            });
        }

        let (mission, sensor) = match components[0].split('_').collect::<Vec<_>>()[..] {
            [mission, sensor] if !mission.is_empty() && !sensor.is_empty() => (mission, sensor),
            _ => {
                return Err(GranuleNameError::BadPlatform {
                    name: name(),
                    platform: components[0].to_string(),
                })
            }
        };

        let bad_date = || GranuleNameError::BadDate {
            name: name(),
            value: components[1].to_string(),
        };
        let captures = date_pattern().captures(components[1]).ok_or_else(bad_date)?;
        let date = NaiveDate::parse_from_str(&captures[1], "%Y%m%d").map_err(|_| bad_date())?;
        let time = captures.get(2).map(|m| m.as_str().to_string());

        let level = match components[2] {
            "L2" => Level::L2,
            "L3b" => Level::L3Binned,
            "L3m" => Level::L3Mapped,
            other => {
                return Err(GranuleNameError::UnknownLevel {
                    name: name(),
                    level: other.to_string(),
                })
            }
        };

        if components.len() != level.component_count() {
            return Err(GranuleNameError::ComponentCount {
                name: name(),
                level,
                expected: level.component_count(),
                found: components.len(),
            });
        }

        let (period, suite, resolution) = match level {
            Level::L2 => (None, components[3], None),
            Level::L3Binned | Level::L3Mapped => (
                Some(components[3].to_string()),
                components[4],
                Some(components[5].to_string()),
            ),
        };

        Ok(Self {
            file_name: file_name.to_string(),
            mission: mission.to_string(),
            sensor: sensor.to_string(),
            date,
            time,
            level,
            period,
            suite: suite.to_string(),
            resolution,
            extension: extension.to_string(),
        })
    }

    /// The full file name, which is also the entity id.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mission(&self) -> &str {
        &self.mission
    }

    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Acquisition time of day (`HHMMSS`) when the name carries one.
    pub fn time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Compositing period of level-3 names (`DAY`, `8D`, ...).
    pub fn period(&self) -> Option<&str> {
        self.period.as_deref()
    }

    /// Product suite (`OC`, `SST`, ...).
    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `MISSION_SENSOR`, the per-platform directory name.
    pub fn platform(&self) -> String {
        format!("{}_{}", self.mission, self.sensor)
    }

    /// Name of the daily mapped product a level-2 granule feeds into.
    pub fn target_name(&self, resolution: &str) -> Option<String> {
        self.daily_name(Level::L3Mapped, resolution)
    }

    /// Name of the binned intermediate built on the way to [`Self::target_name`].
    pub fn binned_name(&self, resolution: &str) -> Option<String> {
        self.daily_name(Level::L3Binned, resolution)
    }

    /// The same level-3 name at another level-3 stage (e.g. L3m → L3b).
    pub fn at_level(&self, level: Level) -> Option<String> {
        if self.level == Level::L2 || level == Level::L2 {
            return None;
        }
        Some(format!(
            "{}.{}.{}.{}.{}.{}.{}",
            self.platform(),
            self.date.format("%Y%m%d"),
            level,
            self.period.as_deref()?,
            self.suite,
            self.resolution.as_deref()?,
            self.extension
        ))
    }

    fn daily_name(&self, level: Level, resolution: &str) -> Option<String> {
        if self.level != Level::L2 {
            return None;
        }
        Some(format!(
            "{}.{}.{}.DAY.{}.{}.nc",
            self.platform(),
            self.date.format("%Y%m%d"),
            level,
            self.suite,
            resolution
        ))
    }
}

impl fmt::Display for GranuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level2() {
        let name = GranuleName::parse("AQUA_MODIS.20230101T003001.L2.OC.nc").unwrap();
        assert_eq!(name.mission(), "AQUA");
        assert_eq!(name.sensor(), "MODIS");
        assert_eq!(name.date(), NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(name.time(), Some("003001"));
        assert_eq!(name.level(), Level::L2);
        assert_eq!(name.suite(), "OC");
        assert_eq!(name.period(), None);
        assert_eq!(name.extension(), "nc");
        assert_eq!(name.platform(), "AQUA_MODIS");
    }

    #[test]
    fn test_parse_level2_without_time() {
        let name = GranuleName::parse("SNPP_VIIRS.20220615.L2.SST.nc").unwrap();
        assert_eq!(name.time(), None);
        assert_eq!(name.suite(), "SST");
    }

    #[test]
    fn test_parse_level3_mapped() {
        let name = GranuleName::parse("AQUA_MODIS.20230101.L3m.DAY.OC.1km.nc").unwrap();
        assert_eq!(name.level(), Level::L3Mapped);
        assert_eq!(name.period(), Some("DAY"));
        assert_eq!(name.suite(), "OC");
        assert_eq!(name.resolution(), Some("1km"));
    }

    #[test]
    fn test_target_and_binned_names() {
        let name = GranuleName::parse("NOAA20_VIIRS.20230405T120000.L2.OC.nc").unwrap();
        assert_eq!(
            name.target_name("4km").as_deref(),
            Some("NOAA20_VIIRS.20230405.L3m.DAY.OC.4km.nc")
        );
        assert_eq!(
            name.binned_name("4km").as_deref(),
            Some("NOAA20_VIIRS.20230405.L3b.DAY.OC.4km.nc")
        );
    }

    #[test]
    fn test_target_name_round_trips_through_parser() {
        let name = GranuleName::parse("AQUA_MODIS.20230101T003001.L2.OC.nc").unwrap();
        let target = GranuleName::parse(&name.target_name("1km").unwrap()).unwrap();
        assert_eq!(target.level(), Level::L3Mapped);
        assert_eq!(target.date(), name.date());
        assert_eq!(target.platform(), name.platform());
    }

    #[test]
    fn test_at_level() {
        let name = GranuleName::parse("AQUA_MODIS.20230101.L3m.DAY.OC.1km.nc").unwrap();
        assert_eq!(
            name.at_level(Level::L3Binned).as_deref(),
            Some("AQUA_MODIS.20230101.L3b.DAY.OC.1km.nc")
        );
        let l2 = GranuleName::parse("AQUA_MODIS.20230101.L2.OC.nc").unwrap();
        assert_eq!(l2.at_level(Level::L3Binned), None);
    }

    #[test]
    fn test_level3_has_no_target() {
        let name = GranuleName::parse("AQUA_MODIS.20230101.L3m.DAY.OC.1km.nc").unwrap();
        assert_eq!(name.target_name("1km"), None);
    }

    #[test]
    fn test_missing_extension() {
        assert!(matches!(
            GranuleName::parse("README"),
            Err(GranuleNameError::MissingExtension { .. })
        ));
    }

    #[test]
    fn test_bad_platform() {
        assert!(matches!(
            GranuleName::parse("MODIS.20230101.L2.OC.nc"),
            Err(GranuleNameError::BadPlatform { .. })
        ));
        assert!(matches!(
            GranuleName::parse("A_B_C.20230101.L2.OC.nc"),
            Err(GranuleNameError::BadPlatform { .. })
        ));
    }

    #[test]
    fn test_bad_date() {
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS.2023011.L2.OC.nc"),
            Err(GranuleNameError::BadDate { .. })
        ));
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS.20231301.L2.OC.nc"),
            Err(GranuleNameError::BadDate { .. })
        ));
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS.20230101T12.L2.OC.nc"),
            Err(GranuleNameError::BadDate { .. })
        ));
    }

    #[test]
    fn test_unknown_level() {
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS.20230101.L1A.OC.nc"),
            Err(GranuleNameError::UnknownLevel { .. })
        ));
    }

    #[test]
    fn test_wrong_component_count() {
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS.20230101.L2.OC.extra.nc"),
            Err(GranuleNameError::ComponentCount { expected: 4, found: 5, .. })
        ));
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS.20230101.L3m.DAY.OC.nc"),
            Err(GranuleNameError::ComponentCount { expected: 6, found: 5, .. })
        ));
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS.20230101.nc"),
            Err(GranuleNameError::ComponentCount { .. })
        ));
    }

    #[test]
    fn test_empty_component() {
        assert!(matches!(
            GranuleName::parse("AQUA_MODIS..L2.OC.nc"),
            Err(GranuleNameError::EmptyComponent { .. })
        ));
    }
}
