use std::fmt;

use super::GranuleNameError;

/// Ocean color missions that can be queued from the remote catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mission {
    AquaModis,
    TerraModis,
    Noaa20Viirs,
    SnppViirs,
    SeaWifs,
}

impl Mission {
    pub const ALL: [Mission; 5] = [
        Mission::AquaModis,
        Mission::TerraModis,
        Mission::Noaa20Viirs,
        Mission::SnppViirs,
        Mission::SeaWifs,
    ];

    /// Single-letter code used on the command line.
    pub fn code(&self) -> char {
        match self {
            Mission::AquaModis => 'a',
            Mission::TerraModis => 't',
            Mission::Noaa20Viirs => 'j',
            Mission::SnppViirs => 'n',
            Mission::SeaWifs => 's',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.code() == code.to_ascii_lowercase())
    }

    /// Catalog collection short name of the level-2 ocean color product.
    pub fn short_name(&self) -> &'static str {
        match self {
            Mission::AquaModis => "MODISA_L2_OC",
            Mission::TerraModis => "MODIST_L2_OC",
            Mission::Noaa20Viirs => "VIIRSJ1_L2_OC",
            Mission::SnppViirs => "VIIRSN_L2_OC",
            Mission::SeaWifs => "SEAWIFS_L2_OC",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Mission::AquaModis => "Aqua MODIS",
            Mission::TerraModis => "Terra MODIS",
            Mission::Noaa20Viirs => "NOAA-20 VIIRS",
            Mission::SnppViirs => "Suomi-NPP VIIRS",
            Mission::SeaWifs => "SeaWiFS",
        }
    }
}

impl fmt::Display for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Parse a string of mission letters (e.g. `"atj"`), keeping first-seen order.
pub fn parse_missions(codes: &str) -> Result<Vec<Mission>, GranuleNameError> {
    let mut missions = Vec::new();
    for code in codes.chars().filter(|c| !c.is_whitespace()) {
        let mission = Mission::from_code(code).ok_or_else(|| GranuleNameError::UnknownMission {
            code: code.to_string(),
        })?;
        if !missions.contains(&mission) {
            missions.push(mission);
        }
    }
    Ok(missions)
}
