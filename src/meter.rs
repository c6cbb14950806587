//! Service-data matching and payload decoding for the SwitchBot Meter.
//!
//! The meter broadcasts its reading as a 6-byte service-data payload. Each
//! value byte packs a 7-bit magnitude with bit 7 reserved as a flag; the
//! temperature additionally carries a fractional nibble in tenths of a degree
//! and uses the flag of byte 4 as its sign.
//!
//! Layout (ref: SwitchBot Meter BLE open API, "new broadcast message"):
//! - byte 0: device type (`0x54` after masking bit 7)
//! - byte 2: battery percentage
//! - byte 3, low nibble: temperature tenths
//! - byte 4: temperature whole degrees, bit 7 clear means negative
//! - byte 5: humidity percentage

use crate::advert::ServiceData;
use crate::mac_address::MacAddress;
use serde::Serialize;
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

/// 16-bit service-data UUID `0d00` expanded on the Bluetooth base UUID, the
/// form BlueZ uses to key service-data records.
pub const METER_SERVICE_DATA_UUID: Uuid = Uuid::from_u128(0x00000d00_0000_1000_8000_00805f9b34fb);

/// Device-type byte identifying the meter within the vendor's broadcast
/// scheme.
pub const DEVICE_TYPE_METER: u8 = 0x54;

/// Minimum payload length for a decodable reading.
pub const MIN_PAYLOAD_LEN: usize = 6;

/// A broadcast byte packing a 7-bit magnitude with a flag in bit 7.
#[derive(Debug, Clone, Copy)]
struct MaskedByte(u8);

impl MaskedByte {
    fn magnitude(self) -> u8 {
        self.0 & 0x7F
    }

    fn flag(self) -> bool {
        self.0 & 0x80 != 0
    }
}

/// Errors returned when decoding a service-data payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload too short to carry a reading. Recoverable: the record is
    /// skipped and scanning continues.
    #[error("malformed payload: got {0} bytes, need at least {MIN_PAYLOAD_LEN}")]
    MalformedPayload(usize),
}

/// Check whether a service-data record carries a meter reading.
///
/// True iff the record's UUID is [`METER_SERVICE_DATA_UUID`] and its first
/// payload byte, with the reserved bit 7 masked off, equals
/// [`DEVICE_TYPE_METER`]. Empty payloads never match.
pub fn is_meter_service_data(sd: &ServiceData) -> bool {
    if sd.uuid != METER_SERVICE_DATA_UUID {
        return false;
    }
    match sd.data.first() {
        Some(&dtype) => MaskedByte(dtype).magnitude() == DEVICE_TYPE_METER,
        None => false,
    }
}

/// One decoded meter reading, serialized as a flat JSON record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    /// Hardware address of the source device, taken from the enclosing
    /// advertisement.
    #[serde(rename = "addr")]
    pub address: MacAddress,
    /// Battery percentage (0-127, bit 7 reserved).
    #[serde(rename = "bat")]
    pub battery: u8,
    /// Temperature in Celsius with one fractional digit.
    #[serde(rename = "temp")]
    pub temperature: f64,
    /// Relative humidity percentage (0-127, bit 7 reserved).
    #[serde(rename = "humi")]
    pub humidity: u8,
    /// Capture time in milliseconds since the Unix epoch. The payload carries
    /// no timestamp; this is stamped at decode time from the injected clock.
    #[serde(rename = "ts")]
    pub timestamp: i64,
}

impl Metric {
    /// Decode a matched service-data payload into a reading.
    ///
    /// `now` is the capture instant; injecting it keeps decoding a pure
    /// function of its inputs. Fails only for payloads shorter than
    /// [`MIN_PAYLOAD_LEN`] bytes.
    pub fn decode(
        sd: &ServiceData,
        address: MacAddress,
        now: SystemTime,
    ) -> Result<Self, DecodeError> {
        if sd.data.len() < MIN_PAYLOAD_LEN {
            return Err(DecodeError::MalformedPayload(sd.data.len()));
        }

        let battery = MaskedByte(sd.data[2]).magnitude();
        let humidity = MaskedByte(sd.data[5]).magnitude();

        // Sum whole degrees and tenths in integer tenths, dividing once so
        // the value carries exactly one decimal digit.
        let degrees = MaskedByte(sd.data[4]);
        let tenths = sd.data[3] & 0x0F;
        let magnitude = f64::from(u16::from(degrees.magnitude()) * 10 + u16::from(tenths)) / 10.0;
        // Flag clear means negative. A zero magnitude stays 0.0 either way,
        // avoiding a -0.0 in the output.
        let temperature = if degrees.flag() || magnitude == 0.0 {
            magnitude
        } else {
            -magnitude
        };

        let timestamp = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64);

        Ok(Metric {
            address,
            battery,
            temperature,
            humidity,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn meter_record(data: Vec<u8>) -> ServiceData {
        ServiceData {
            uuid: METER_SERVICE_DATA_UUID,
            data,
        }
    }

    fn test_clock() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123)
    }

    #[test]
    fn test_is_meter_service_data() {
        assert!(is_meter_service_data(&meter_record(vec![0x54])));
        // Reserved bit 7 is masked off before the type comparison.
        assert!(is_meter_service_data(&meter_record(vec![0xD4])));
    }

    #[test]
    fn test_is_meter_service_data_wrong_uuid() {
        let sd = ServiceData {
            uuid: Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb),
            data: vec![0x54],
        };
        assert!(!is_meter_service_data(&sd));
    }

    #[test]
    fn test_is_meter_service_data_wrong_device_type() {
        assert!(!is_meter_service_data(&meter_record(vec![0x53])));
    }

    #[test]
    fn test_is_meter_service_data_empty_payload() {
        assert!(!is_meter_service_data(&meter_record(vec![])));
    }

    #[test]
    fn test_decode_positive_temperature() {
        // bat = 0x5C & 0x7F = 92, temp = 23 + 0.1 with sign bit set,
        // humi = 0x37 & 0x7F = 55
        let sd = meter_record(vec![0x54, 0x00, 0x5C, 0x01, 0x97, 0x37]);
        let metric = Metric::decode(&sd, TEST_MAC, test_clock()).unwrap();
        assert_eq!(metric.address, TEST_MAC);
        assert_eq!(metric.battery, 92);
        assert_eq!(metric.temperature, 23.1);
        assert_eq!(metric.humidity, 55);
        assert_eq!(metric.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn test_decode_negative_temperature() {
        // byte 4 = 0x17: bit 7 clear, magnitude 23; tenths nibble 5
        let sd = meter_record(vec![0x54, 0x00, 0x5C, 0x05, 0x17, 0x37]);
        let metric = Metric::decode(&sd, TEST_MAC, test_clock()).unwrap();
        assert_eq!(metric.temperature, -23.5);
    }

    #[test]
    fn test_decode_zero_temperature_ignores_sign() {
        // Sign is a don't-care at exactly zero; never emit -0.0.
        let sd = meter_record(vec![0x54, 0x00, 0x5C, 0x00, 0x00, 0x37]);
        let metric = Metric::decode(&sd, TEST_MAC, test_clock()).unwrap();
        assert_eq!(metric.temperature, 0.0);
        assert!(metric.temperature.is_sign_positive());
    }

    #[test]
    fn test_decode_masks_reserved_bits() {
        // Battery and humidity bytes with bit 7 set still land in 0..=127.
        let sd = meter_record(vec![0x54, 0x00, 0xFF, 0x00, 0xFF, 0xFF]);
        let metric = Metric::decode(&sd, TEST_MAC, test_clock()).unwrap();
        assert_eq!(metric.battery, 127);
        assert_eq!(metric.humidity, 127);
        assert_eq!(metric.temperature, 127.0);
    }

    #[test]
    fn test_decode_short_payload() {
        let sd = meter_record(vec![0x54, 0x00, 0x5C, 0x01, 0x97]);
        assert_eq!(
            Metric::decode(&sd, TEST_MAC, test_clock()),
            Err(DecodeError::MalformedPayload(5))
        );
    }

    #[test]
    fn test_decode_is_deterministic() {
        let sd = meter_record(vec![0x54, 0x00, 0x5C, 0x01, 0x97, 0x37]);
        let a = Metric::decode(&sd, TEST_MAC, test_clock()).unwrap();
        let b = Metric::decode(&sd, TEST_MAC, test_clock()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_metric_json_shape() {
        let sd = meter_record(vec![0x54, 0x00, 0x5C, 0x01, 0x97, 0x37]);
        let metric = Metric::decode(&sd, TEST_MAC, test_clock()).unwrap();
        let json = serde_json::to_string(&metric).unwrap();
        assert_eq!(
            json,
            "{\"addr\":\"AA:BB:CC:DD:EE:FF\",\"bat\":92,\"temp\":23.1,\"humi\":55,\"ts\":1700000000123}"
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::MalformedPayload(3);
        assert_eq!(
            format!("{}", err),
            "malformed payload: got 3 bytes, need at least 6"
        );
    }
}
