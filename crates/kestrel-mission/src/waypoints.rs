use serde::Deserialize;
use thiserror::Error;

/// One 3-D mission waypoint. Altitude is relative to the launch point.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
}

#[derive(Debug, Error)]
pub enum MissionDataError {
    #[error("read mission file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse mission file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("mission file contains no waypoints")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct MissionFile {
    #[serde(default)]
    waypoints: Vec<Waypoint>,
}

/// Loads the ordered waypoint sequence. The sequence is immutable after
/// this returns and is never allowed to be empty; the supervisor treats
/// any error here as fatal.
pub fn load(path: &str) -> Result<Vec<Waypoint>, MissionDataError> {
    let text = std::fs::read_to_string(path).map_err(|source| MissionDataError::Unreadable {
        path: path.to_string(),
        source,
    })?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<Vec<Waypoint>, MissionDataError> {
    let file: MissionFile = toml::from_str(text)?;
    if file.waypoints.is_empty() {
        return Err(MissionDataError::Empty);
    }
    Ok(file.waypoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MISSION: &str = r#"
[[waypoints]]
lat = 45.0
lon = -75.0
alt_m = 20.0

[[waypoints]]
lat = 45.001
lon = -75.001
alt_m = 20.0
"#;

    #[test]
    fn parses_ordered_waypoints() {
        let wps = parse(MISSION).unwrap();
        assert_eq!(wps.len(), 2);
        assert_eq!(wps[0].lat, 45.0);
        assert_eq!(wps[1].lon, -75.001);
    }

    #[test]
    fn empty_mission_is_rejected() {
        assert!(matches!(parse(""), Err(MissionDataError::Empty)));
        assert!(matches!(
            parse("waypoints = []"),
            Err(MissionDataError::Empty)
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            parse("[[waypoints]]\nlat = \"north\""),
            Err(MissionDataError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_unreadable() {
        assert!(matches!(
            load("/nonexistent/mission.toml"),
            Err(MissionDataError::Unreadable { .. })
        ));
    }

    #[test]
    fn loads_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(MISSION.as_bytes()).unwrap();
        let wps = load(f.path().to_str().unwrap()).unwrap();
        assert_eq!(wps.len(), 2);
    }
}
