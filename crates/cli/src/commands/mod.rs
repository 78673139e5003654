pub mod config;
pub mod info;
pub mod join;
pub mod run;
pub mod scan;

use daynalink_net::NetworkEntry;

/// Render a BSSID as colon-separated hex.
pub(crate) fn format_bssid(bssid: &[u8; 6]) -> String {
    bssid
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub(crate) fn print_network(entry: &NetworkEntry) {
    println!(
        "  {:<32} {}  ch {:>3}  {:>4} dBm",
        entry.ssid(),
        format_bssid(&entry.bssid),
        entry.channel,
        entry.rssi
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bssid_is_lowercase_hex() {
        assert_eq!(
            format_bssid(&[0x00, 0x1b, 0x2C, 0xff, 0x0a, 0x01]),
            "00:1b:2c:ff:0a:01"
        );
    }
}
