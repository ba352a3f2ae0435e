use std::net::IpAddr;

/// Country/city tag derived from an IP address.
///
/// Only local-range classification happens here: private and loopback
/// addresses tag as "Local", everything else as "Unknown". There is no
/// external geolocation call in this design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoTag {
    pub country: String,
    pub city: String,
}

/// Device/browser/OS tags parsed from a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub device_type: String,
    pub browser: String,
    pub operating_system: String,
}

/// Check whether an address sits in a private or loopback range.
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Classify an IP string into a geo tag.
pub fn classify_ip(ip: &str) -> GeoTag {
    let local = ip
        .parse::<IpAddr>()
        .map(is_local_ip)
        .unwrap_or(false);

    if local {
        GeoTag {
            country: "Local".to_string(),
            city: "Local".to_string(),
        }
    } else {
        GeoTag {
            country: "Unknown".to_string(),
            city: "Unknown".to_string(),
        }
    }
}

/// Parse a user-agent string with substring checks. Check order matters:
/// Edge advertises "Chrome", iPads advertise "Safari", Android advertises
/// "Linux".
pub fn parse_user_agent(ua: &str) -> ClientInfo {
    let lower = ua.to_lowercase();

    let device_type = if lower.contains("ipad") || lower.contains("tablet") {
        "Tablet"
    } else if lower.contains("mobile") || lower.contains("iphone") || lower.contains("android") {
        "Mobile"
    } else {
        "Desktop"
    };

    let browser = if lower.contains("edg") {
        "Edge"
    } else if lower.contains("firefox") {
        "Firefox"
    } else if lower.contains("chrome") {
        "Chrome"
    } else if lower.contains("safari") {
        "Safari"
    } else {
        "Unknown"
    };

    let operating_system = if lower.contains("windows") {
        "Windows"
    } else if lower.contains("android") {
        "Android"
    } else if lower.contains("iphone") || lower.contains("ipad") || lower.contains("ios") {
        "iOS"
    } else if lower.contains("mac os") || lower.contains("macintosh") {
        "macOS"
    } else if lower.contains("linux") {
        "Linux"
    } else {
        "Unknown"
    };

    ClientInfo {
        device_type: device_type.to_string(),
        browser: browser.to_string(),
        operating_system: operating_system.to_string(),
    }
}
