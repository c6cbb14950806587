//! Advertisement snapshot and scan-response classification.
//!
//! The scanner backend reduces each BLE broadcast to an [`Advertisement`]
//! value that is independent of the Bluetooth library, so the filtering rules
//! can be tested without hardware.

use crate::mac_address::MacAddress;
use uuid::Uuid;

/// Service UUID the meter advertises on its scan-response frames. Only
/// advertisements declaring this service carry sensor readings.
pub const SCAN_RESPONSE_UUID: Uuid = Uuid::from_u128(0xcba20d00_224d_11e6_9fb8_0002a5d5c51b);

/// One service-data record from an advertisement: a service UUID paired with
/// an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    pub uuid: Uuid,
    pub data: Vec<u8>,
}

/// A snapshot of one received BLE advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Hardware address of the advertising device.
    pub address: MacAddress,
    /// Service UUIDs the device declares.
    pub services: Vec<Uuid>,
    /// Service-data records carried by the advertisement, in received order.
    pub service_data: Vec<ServiceData>,
}

/// Return the service-data records of `ad` if it is a scan-response frame
/// from the meter device family, optionally restricted to a single hardware
/// address.
///
/// An advertisement qualifies when [`SCAN_RESPONSE_UUID`] appears anywhere in
/// its advertised services and, if `filter` is set, its address equals the
/// filter. Anything else yields an empty slice; dropping foreign
/// advertisements is routine, not an error.
pub fn scan_response_records<'a>(
    ad: &'a Advertisement,
    filter: Option<&MacAddress>,
) -> &'a [ServiceData] {
    if !ad.services.contains(&SCAN_RESPONSE_UUID) {
        return &[];
    }
    if let Some(address) = filter {
        if ad.address != *address {
            return &[];
        }
    }
    &ad.service_data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::METER_SERVICE_DATA_UUID;

    const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn record() -> ServiceData {
        ServiceData {
            uuid: METER_SERVICE_DATA_UUID,
            data: vec![0x54, 0x00, 0x5C, 0x01, 0x97, 0x37],
        }
    }

    fn advertisement(services: Vec<Uuid>) -> Advertisement {
        Advertisement {
            address: TEST_MAC,
            services,
            service_data: vec![record()],
        }
    }

    #[test]
    fn test_qualifying_advertisement_exposes_records() {
        let ad = advertisement(vec![SCAN_RESPONSE_UUID]);
        assert_eq!(scan_response_records(&ad, None), &[record()][..]);
    }

    #[test]
    fn test_scan_response_uuid_may_appear_anywhere() {
        let other = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
        let ad = advertisement(vec![other, SCAN_RESPONSE_UUID]);
        assert_eq!(scan_response_records(&ad, None).len(), 1);
    }

    #[test]
    fn test_missing_scan_response_uuid_yields_nothing() {
        // Service data alone does not qualify the advertisement.
        let ad = advertisement(vec![]);
        assert!(scan_response_records(&ad, None).is_empty());
    }

    #[test]
    fn test_address_filter_match() {
        let ad = advertisement(vec![SCAN_RESPONSE_UUID]);
        assert_eq!(scan_response_records(&ad, Some(&TEST_MAC)).len(), 1);
    }

    #[test]
    fn test_address_filter_mismatch_yields_nothing() {
        let ad = advertisement(vec![SCAN_RESPONSE_UUID]);
        let other = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        assert!(scan_response_records(&ad, Some(&other)).is_empty());
    }

    #[test]
    fn test_address_filter_parsed_case_insensitively() {
        let ad = advertisement(vec![SCAN_RESPONSE_UUID]);
        let filter: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(scan_response_records(&ad, Some(&filter)).len(), 1);
    }

    #[test]
    fn test_empty_advertisement() {
        let ad = Advertisement {
            address: TEST_MAC,
            services: vec![],
            service_data: vec![],
        };
        assert!(scan_response_records(&ad, None).is_empty());
    }

    #[test]
    fn test_records_keep_original_order() {
        let second = ServiceData {
            uuid: METER_SERVICE_DATA_UUID,
            data: vec![0x54, 0x00, 0x64, 0x00, 0x80, 0x00],
        };
        let ad = Advertisement {
            address: TEST_MAC,
            services: vec![SCAN_RESPONSE_UUID],
            service_data: vec![record(), second.clone()],
        };
        assert_eq!(scan_response_records(&ad, None), &[record(), second][..]);
    }
}
