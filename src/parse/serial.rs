use once_cell::sync::Lazy;
use regex::Regex;

use super::{capture, capture_first, compile, normalize};
use crate::dialect::{Family, Vendor};

static CISCO_BOARD_ID: Lazy<Regex> =
    Lazy::new(|| compile(r"(?:Processor board ID|System Serial Number)\s*:?\s*([A-Z0-9]+)"));
static HUAWEI_ESN: Lazy<Regex> =
    Lazy::new(|| compile(r"ESN(?:\s+of\s+slot\s+\d+)?\s*:?\s*([A-Z0-9]+)"));

static INVENTORY_SN: Lazy<Regex> = Lazy::new(|| compile(r"\bSN:\s*([A-Z0-9]+)"));
static INVENTORY_SERIAL_NUMBER: Lazy<Regex> =
    Lazy::new(|| compile(r"Serial Number:\s*([A-Z0-9]+)"));
static ELABEL_BARCODE: Lazy<Regex> = Lazy::new(|| compile(r"BarCode=([A-Z0-9]+)"));

/// Serial number printed by the version command, if any.
pub fn serial_from_version(output: &str, vendor: Vendor) -> Option<String> {
    let text = normalize(output);
    match vendor.family() {
        Family::CiscoLike => capture(&CISCO_BOARD_ID, &text),
        Family::HuaweiLike => capture(&HUAWEI_ESN, &text),
        Family::Other => None,
    }
}

/// Serial number of the chassis from inventory output. The first entry in
/// an inventory listing is the chassis.
pub fn serial_from_inventory(output: &str, vendor: Vendor) -> Option<String> {
    let text = normalize(output);
    match vendor.family() {
        Family::CiscoLike => capture_first(&[&INVENTORY_SN, &INVENTORY_SERIAL_NUMBER], &text),
        Family::HuaweiLike => capture(&ELABEL_BARCODE, &text),
        Family::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cisco_board_id_from_version() {
        let text = "Processor board ID FDO1234X5YZ\nLast reset from power-on\n";
        assert_eq!(
            serial_from_version(text, Vendor::CiscoIos).as_deref(),
            Some("FDO1234X5YZ")
        );
        assert_eq!(
            serial_from_version("System Serial Number : FOC1111A2BC", Vendor::CiscoIos).as_deref(),
            Some("FOC1111A2BC")
        );
    }

    #[test]
    fn huawei_esn_from_version() {
        assert_eq!(
            serial_from_version("ESN of slot 0: 2102351931P0B3000123", Vendor::Huawei).as_deref(),
            Some("2102351931P0B3000123")
        );
        assert_eq!(serial_from_version("VRP (R) software", Vendor::Huawei), None);
    }

    #[test]
    fn cisco_inventory_prefers_sn_field() {
        let text = "NAME: \"1\", DESCR: \"WS-C2960X-24TS-L\"\r\nPID: WS-C2960X-24TS-L  , VID: V02  , SN: FOC12345678\r\n";
        assert_eq!(
            serial_from_inventory(text, Vendor::CiscoIos).as_deref(),
            Some("FOC12345678")
        );
    }

    #[test]
    fn huawei_elabel_barcode() {
        let text = "[Board Properties]\nBoardType=CX22EFGA\nBarCode=021TKF10K3000456\nItem=02311TKF\n";
        assert_eq!(
            serial_from_inventory(text, Vendor::Huawei).as_deref(),
            Some("021TKF10K3000456")
        );
    }

    #[test]
    fn nothing_found_is_none() {
        assert_eq!(serial_from_inventory("", Vendor::CiscoIos), None);
        assert_eq!(serial_from_version("SN: ABC", Vendor::Juniper), None);
    }
}
