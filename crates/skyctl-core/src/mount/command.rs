// ── Mount command vocabulary ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr};

/// Mount commands with their stable numeric codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, FromRepr,
)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MountCommand {
    Unpark = 0,
    Park = 1,
    MoveNorthStart = 2,
    MoveNorthStop = 3,
    MoveSouthStart = 4,
    MoveSouthStop = 5,
    MoveWestStart = 6,
    MoveWestStop = 7,
    MoveEastStart = 8,
    MoveEastStop = 9,
    GoTo = 10,
    Sync = 11,
    ParkDefault = 12,
    FitPointingModel = 13,
    TestSync = 14,
}

impl MountCommand {
    #[allow(clippy::as_conversions)]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Directional motion this command starts or stops, if any.
    pub fn motion(self) -> Option<(Direction, bool)> {
        match self {
            Self::MoveNorthStart => Some((Direction::North, true)),
            Self::MoveNorthStop => Some((Direction::North, false)),
            Self::MoveSouthStart => Some((Direction::South, true)),
            Self::MoveSouthStop => Some((Direction::South, false)),
            Self::MoveWestStart => Some((Direction::West, true)),
            Self::MoveWestStop => Some((Direction::West, false)),
            Self::MoveEastStart => Some((Direction::East, true)),
            Self::MoveEastStop => Some((Direction::East, false)),
            _ => None,
        }
    }

    /// Whether the command needs target coordinates.
    pub fn needs_target(self) -> bool {
        matches!(self, Self::GoTo | Self::Sync | Self::TestSync)
    }
}

/// Manual motion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    /// Motion property and element driving this direction.
    pub fn property(self) -> (&'static str, &'static str) {
        match self {
            Self::North => ("MOUNT_MOTION_DEC", "NORTH"),
            Self::South => ("MOUNT_MOTION_DEC", "SOUTH"),
            Self::West => ("MOUNT_MOTION_RA", "WEST"),
            Self::East => ("MOUNT_MOTION_RA", "EAST"),
        }
    }

    pub fn start(self) -> MountCommand {
        match self {
            Self::North => MountCommand::MoveNorthStart,
            Self::South => MountCommand::MoveSouthStart,
            Self::West => MountCommand::MoveWestStart,
            Self::East => MountCommand::MoveEastStart,
        }
    }

    pub fn stop(self) -> MountCommand {
        match self {
            Self::North => MountCommand::MoveNorthStop,
            Self::South => MountCommand::MoveSouthStop,
            Self::West => MountCommand::MoveWestStop,
            Self::East => MountCommand::MoveEastStop,
        }
    }
}

/// Manual slew speed (`MOUNT_SLEW_RATE` elements).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlewRate {
    Guide,
    Centering,
    #[default]
    Find,
    Max,
}

/// Side of the pier the telescope tube is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum PierSide {
    West,
    East,
    #[default]
    None,
}

/// How GOTO targets are corrected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentMethod {
    /// Slew to the catalogue position.
    #[default]
    None,
    /// Correct targets with the fitted analytical model.
    AnalyticalModel,
    /// Let the server correct targets from SYNC data it was sent.
    ServerModel,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn codes_are_stable() {
        let codes: Vec<u8> = MountCommand::iter().map(MountCommand::code).collect();
        assert_eq!(codes, (0..=14).collect::<Vec<u8>>());
        assert_eq!(MountCommand::from_repr(13), Some(MountCommand::FitPointingModel));
        assert_eq!(MountCommand::TestSync.to_string(), "TEST_SYNC");
        assert_eq!("PARK_DEFAULT".parse::<MountCommand>().unwrap(), MountCommand::ParkDefault);
    }

    #[test]
    fn motion_pairs() {
        for dir in [Direction::North, Direction::South, Direction::West, Direction::East] {
            assert_eq!(dir.start().motion(), Some((dir, true)));
            assert_eq!(dir.stop().motion(), Some((dir, false)));
        }
        assert_eq!(MountCommand::GoTo.motion(), None);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("centering".parse::<SlewRate>().unwrap(), SlewRate::Centering);
        assert_eq!("East".parse::<PierSide>().unwrap(), PierSide::East);
        assert_eq!(
            "analytical-model".parse::<AlignmentMethod>().unwrap(),
            AlignmentMethod::AnalyticalModel
        );
    }
}
