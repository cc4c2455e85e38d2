// ── Simulated device definitions ──

use skyctl_api::{PropertyPerm, PropertyState, SwitchRule};

use super::SimulatorConfig;
use super::property::SimProperty;
use crate::astro;

pub const CCD_DEVICE: &str = "CCD Imager Simulator @ localhost";
pub const MOUNT_DEVICE: &str = "Mount Simulator @ localhost";

/// Hour angle of the default park position.
pub(super) const PARK_HOUR_ANGLE: f64 = 12.0;

fn connection(device: &str) -> SimProperty {
    SimProperty::new(device, "CONNECTION", "Main", PropertyPerm::ReadWrite)
        .rule(SwitchRule::OneOfMany)
        .state(PropertyState::Ok)
        .switch("CONNECTED", false)
        .switch("DISCONNECTED", true)
}

fn info(device: &str, driver: &str) -> SimProperty {
    SimProperty::new(device, "INFO", "Main", PropertyPerm::ReadOnly)
        .state(PropertyState::Ok)
        .text("DEVICE_NAME", device)
        .text("DEVICE_VERSION", "1.0")
        .text("DRIVER_NAME", driver)
}

pub(super) fn ccd(config: &SimulatorConfig) -> Vec<SimProperty> {
    let d = CCD_DEVICE;
    vec![
        connection(d),
        info(d, "skyctl_ccd_simulator"),
        SimProperty::new(d, "CCD_INFO", "Camera", PropertyPerm::ReadOnly)
            .state(PropertyState::Ok)
            .number("WIDTH", f64::from(config.ccd_width), 0.0, 65_535.0, "%.0f")
            .number("HEIGHT", f64::from(config.ccd_height), 0.0, 65_535.0, "%.0f")
            .number("PIXEL_SIZE", 5.2, 0.0, 100.0, "%.2f")
            .number("BITS_PER_PIXEL", 16.0, 8.0, 32.0, "%.0f"),
        SimProperty::new(d, "CCD_BIN", "Camera", PropertyPerm::ReadWrite)
            .state(PropertyState::Ok)
            .number("HORIZONTAL", 1.0, 1.0, 64.0, "%.0f")
            .number("VERTICAL", 1.0, 1.0, 64.0, "%.0f"),
        SimProperty::new(d, "CCD_FRAME_TYPE", "Camera", PropertyPerm::ReadWrite)
            .rule(SwitchRule::OneOfMany)
            .state(PropertyState::Ok)
            .switch("LIGHT", true)
            .switch("BIAS", false)
            .switch("DARK", false)
            .switch("FLAT", false),
        SimProperty::new(d, "CCD_UPLOAD_MODE", "Camera", PropertyPerm::ReadWrite)
            .rule(SwitchRule::OneOfMany)
            .state(PropertyState::Ok)
            .switch("CLIENT", true)
            .switch("LOCAL", false)
            .switch("BOTH", false),
        SimProperty::new(d, "CCD_LOCAL_MODE", "Camera", PropertyPerm::ReadWrite)
            .state(PropertyState::Ok)
            .text("DIR", "")
            .text("PREFIX", "IMAGE_XXX"),
        SimProperty::new(d, "CCD_EXPOSURE", "Camera", PropertyPerm::ReadWrite)
            .state(PropertyState::Idle)
            .number("EXPOSURE", 0.0, 0.0, 3600.0, "%.2f"),
        SimProperty::new(d, "CCD_IMAGE", "Camera", PropertyPerm::ReadOnly)
            .state(PropertyState::Idle)
            .blob("IMAGE"),
    ]
}

pub(super) fn mount(config: &SimulatorConfig) -> Vec<SimProperty> {
    let d = MOUNT_DEVICE;
    let park_ra = astro::normalize_hours(config.lst - PARK_HOUR_ANGLE);
    vec![
        connection(d),
        info(d, "skyctl_mount_simulator"),
        SimProperty::new(d, "MOUNT_PARK", "Main", PropertyPerm::ReadWrite)
            .rule(SwitchRule::OneOfMany)
            .state(PropertyState::Ok)
            .switch("PARKED", true)
            .switch("UNPARKED", false),
        SimProperty::new(d, "MOUNT_PARK_SET", "Main", PropertyPerm::ReadWrite)
            .rule(SwitchRule::AtMostOne)
            .state(PropertyState::Ok)
            .switch("DEFAULT", false)
            .switch("CURRENT", false),
        SimProperty::new(d, "MOUNT_SLEW_RATE", "Main", PropertyPerm::ReadWrite)
            .rule(SwitchRule::OneOfMany)
            .state(PropertyState::Ok)
            .switch("GUIDE", false)
            .switch("CENTERING", false)
            .switch("FIND", true)
            .switch("MAX", false),
        SimProperty::new(d, "MOUNT_MOTION_DEC", "Main", PropertyPerm::ReadWrite)
            .rule(SwitchRule::AtMostOne)
            .state(PropertyState::Ok)
            .switch("NORTH", false)
            .switch("SOUTH", false),
        SimProperty::new(d, "MOUNT_MOTION_RA", "Main", PropertyPerm::ReadWrite)
            .rule(SwitchRule::AtMostOne)
            .state(PropertyState::Ok)
            .switch("WEST", false)
            .switch("EAST", false),
        SimProperty::new(d, "MOUNT_ON_COORDINATES_SET", "Main", PropertyPerm::ReadWrite)
            .rule(SwitchRule::OneOfMany)
            .state(PropertyState::Ok)
            .switch("TRACK", true)
            .switch("SYNC", false)
            .switch("SLEW", false),
        SimProperty::new(d, "MOUNT_EQUATORIAL_COORDINATES", "Main", PropertyPerm::ReadWrite)
            .state(PropertyState::Ok)
            .number("RA", park_ra, 0.0, 24.0, "%10.6m")
            .number("DEC", 0.0, -90.0, 90.0, "%10.6m"),
        SimProperty::new(d, "MOUNT_LST_TIME", "Site", PropertyPerm::ReadOnly)
            .state(PropertyState::Ok)
            .number("TIME", config.lst, 0.0, 24.0, "%10.6m"),
        SimProperty::new(d, "MOUNT_GEOGRAPHIC_COORDINATES", "Site", PropertyPerm::ReadWrite)
            .state(PropertyState::Ok)
            .number("LATITUDE", config.latitude, -90.0, 90.0, "%12.6m")
            .number("LONGITUDE", config.longitude, -180.0, 360.0, "%12.6m")
            .number("ELEVATION", 0.0, -400.0, 8000.0, "%.0f"),
        SimProperty::new(d, "MOUNT_SIDE_OF_PIER", "Main", PropertyPerm::ReadOnly)
            .rule(SwitchRule::OneOfMany)
            .state(PropertyState::Ok)
            .switch("EAST", false)
            .switch("WEST", true),
    ]
}
