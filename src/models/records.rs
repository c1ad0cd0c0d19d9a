//! Row types for every table the pipeline reads or writes.

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::run::{PayloadMode, TransmitterPair};
use crate::table::fields::{
    format_datetime, format_optional, parse_datetime, parse_field, parse_integral,
    parse_optional_field, parse_optional_integral,
};
use crate::table::{RowView, TableRecord};

/// Sender role recorded in the signal-strength log.
pub const ROLE_SENDER_A: i64 = 0;
pub const ROLE_SENDER_B: i64 = 1;

/// One reception-log row after the canonical rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionRecord {
    pub exp_count: i64,
    pub mode: i64,
    pub tx_power_a: i64,
    pub tx_power_b: i64,
    /// Clock ticks between the two senders.
    pub time_delta: i64,
    pub rx_count: i64,
    pub tx_count: i64,
}

impl ReceptionRecord {
    pub fn validate(&self) -> Result<()> {
        if self.tx_count <= 0 {
            bail!(
                "experiment {} has non-positive TxCount {}",
                self.exp_count,
                self.tx_count
            );
        }
        if self.rx_count > self.tx_count {
            bail!(
                "experiment {} received {} of {} packets",
                self.exp_count,
                self.rx_count,
                self.tx_count
            );
        }
        Ok(())
    }
}

impl TableRecord for ReceptionRecord {
    const HEADERS: &'static [&'static str] = &[
        "ExpCount", "Mode", "TxPowerA", "TxPowerB", "TimeDelta", "RxCount", "TxCount",
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.exp_count.to_string(),
            self.mode.to_string(),
            self.tx_power_a.to_string(),
            self.tx_power_b.to_string(),
            self.time_delta.to_string(),
            self.rx_count.to_string(),
            self.tx_count.to_string(),
        ]
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            exp_count: parse_integral(row.get("ExpCount")?, "ExpCount")?,
            mode: parse_integral(row.get("Mode")?, "Mode")?,
            tx_power_a: parse_integral(row.get("TxPowerA")?, "TxPowerA")?,
            tx_power_b: parse_integral(row.get("TxPowerB")?, "TxPowerB")?,
            time_delta: parse_integral(row.get("TimeDelta")?, "TimeDelta")?,
            rx_count: parse_integral(row.get("RxCount")?, "RxCount")?,
            tx_count: parse_integral(row.get("TxCount")?, "TxCount")?,
        })
    }
}

/// One usable signal-strength sample (unavailable readings already dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSample {
    pub mode: i64,
    pub transmitter: i64,
    pub tx_power: i64,
    pub rssi: i64,
}

/// Median signal strength of one (mode, sender role, transmit power) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedianRssi {
    pub mode: i64,
    pub transmitter: i64,
    pub tx_power: i64,
    pub median_rssi: f64,
}

impl TableRecord for MedianRssi {
    const HEADERS: &'static [&'static str] = &["Mode", "Transmitter", "TxPower", "medianRSSI"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.mode.to_string(),
            self.transmitter.to_string(),
            self.tx_power.to_string(),
            self.median_rssi.to_string(),
        ]
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            mode: parse_integral(row.get("Mode")?, "Mode")?,
            transmitter: parse_integral(row.get("Transmitter")?, "Transmitter")?,
            tx_power: parse_integral(row.get("TxPower")?, "TxPower")?,
            median_rssi: parse_field(row.get("medianRSSI")?, "medianRSSI")?,
        })
    }
}

/// Reception record joined with signal strength and run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub reception: ReceptionRecord,
    pub rssi_a: Option<f64>,
    pub rssi_b: Option<f64>,
    /// Packet-reception ratio in percent.
    pub prr: f64,
    /// Rounded `rssi_b - rssi_a`; undefined when either median is missing.
    pub power_delta: Option<i64>,
    pub date_time: NaiveDateTime,
    pub payload: PayloadMode,
    pub pair: TransmitterPair,
}

impl TableRecord for EnrichedRecord {
    const HEADERS: &'static [&'static str] = &[
        "ExpCount",
        "Mode",
        "TxPowerA",
        "TxPowerB",
        "TimeDelta",
        "RxCount",
        "TxCount",
        "RssiA",
        "RssiB",
        "PRR",
        "PowerDelta",
        "DateTime",
        "SamePayload",
        "TransPair",
    ];

    fn to_fields(&self) -> Vec<String> {
        let mut fields = self.reception.to_fields();
        fields.extend([
            format_optional(self.rssi_a),
            format_optional(self.rssi_b),
            self.prr.to_string(),
            format_optional(self.power_delta),
            format_datetime(&self.date_time),
            self.payload.label().to_string(),
            self.pair.label().to_string(),
        ]);
        fields
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            reception: ReceptionRecord::from_row(row)?,
            rssi_a: parse_optional_field(row.get("RssiA")?, "RssiA")?,
            rssi_b: parse_optional_field(row.get("RssiB")?, "RssiB")?,
            prr: parse_field(row.get("PRR")?, "PRR")?,
            power_delta: parse_optional_integral(row.get("PowerDelta")?, "PowerDelta")?,
            date_time: parse_datetime(row.get("DateTime")?, "DateTime")?,
            payload: PayloadMode::from_label(row.get("SamePayload")?)?,
            pair: TransmitterPair::from_label(row.get("TransPair")?)?,
        })
    }
}

/// Row of the assembled dataset. `index` is assigned at assembly time in
/// discovery order and is not a durable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRow {
    pub index: usize,
    pub record: EnrichedRecord,
}

impl TableRecord for GlobalRow {
    // The run-local experiment counter is renamed so it cannot be mistaken
    // for the global index.
    const HEADERS: &'static [&'static str] = &[
        "Index",
        "RunExpCount",
        "Mode",
        "TxPowerA",
        "TxPowerB",
        "TimeDelta",
        "RxCount",
        "TxCount",
        "RssiA",
        "RssiB",
        "PRR",
        "PowerDelta",
        "DateTime",
        "SamePayload",
        "TransPair",
    ];

    fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![self.index.to_string()];
        fields.extend(self.record.to_fields());
        fields
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        let reception = ReceptionRecord {
            exp_count: parse_integral(row.get("RunExpCount")?, "RunExpCount")?,
            mode: parse_integral(row.get("Mode")?, "Mode")?,
            tx_power_a: parse_integral(row.get("TxPowerA")?, "TxPowerA")?,
            tx_power_b: parse_integral(row.get("TxPowerB")?, "TxPowerB")?,
            time_delta: parse_integral(row.get("TimeDelta")?, "TimeDelta")?,
            rx_count: parse_integral(row.get("RxCount")?, "RxCount")?,
            tx_count: parse_integral(row.get("TxCount")?, "TxCount")?,
        };
        Ok(Self {
            index: parse_field(row.get("Index")?, "Index")?,
            record: EnrichedRecord {
                reception,
                rssi_a: parse_optional_field(row.get("RssiA")?, "RssiA")?,
                rssi_b: parse_optional_field(row.get("RssiB")?, "RssiB")?,
                prr: parse_field(row.get("PRR")?, "PRR")?,
                power_delta: parse_optional_integral(row.get("PowerDelta")?, "PowerDelta")?,
                date_time: parse_datetime(row.get("DateTime")?, "DateTime")?,
                payload: PayloadMode::from_label(row.get("SamePayload")?)?,
                pair: TransmitterPair::from_label(row.get("TransPair")?)?,
            },
        })
    }
}
