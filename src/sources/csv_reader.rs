use encoding_rs::{Encoding, WINDOWS_1252};
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{AirQualityRecord, AirQualitySource, SensorKey};
use crate::normalize::{air_quality_from_table, MissingValuePolicy, RawTable};

/// Reads per-sensor pm2_5 exports (one date-like and one pollutant-like
/// column, any casing).
pub struct ObservedCsvReader {
    missing_values: MissingValuePolicy,
}

impl Default for ObservedCsvReader {
    fn default() -> Self {
        Self::new(MissingValuePolicy::Drop)
    }
}

impl ObservedCsvReader {
    pub fn new(missing_values: MissingValuePolicy) -> Self {
        Self { missing_values }
    }

    /// Load one sensor's observations. A missing file is not an error: it
    /// is logged and yields no records.
    pub fn read(&self, path: &Path, sensor: &SensorKey) -> Result<Vec<AirQualityRecord>> {
        if !path.exists() {
            warn!(
                sensor = %sensor,
                path = %path.display(),
                "Observed pm2_5 CSV not found, continuing without history"
            );
            return Ok(Vec::new());
        }

        let bytes = fs::read(path)?;
        let text = decode(&bytes);
        let table = RawTable::from_csv_reader(path.display().to_string(), text.as_bytes())?;
        if table.is_empty() {
            warn!(sensor = %sensor, path = %path.display(), "Observed pm2_5 CSV has no rows");
            return Ok(Vec::new());
        }

        let records = air_quality_from_table(table, sensor, AirQualitySource::Observed, self.missing_values)?;
        info!(sensor = %sensor, rows = records.len(), "Loaded observed pm2_5");
        Ok(records)
    }
}

pub fn load_observed_air_quality(
    path: &Path,
    sensor: &SensorKey,
    missing_values: MissingValuePolicy,
) -> Result<Vec<AirQualityRecord>> {
    ObservedCsvReader::new(missing_values).read(path, sensor)
}

/// UTF-8 (BOM stripped) when valid, otherwise Windows-1252.
fn decode(bytes: &[u8]) -> Cow<'_, str> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return encoding.decode_without_bom_handling(&bytes[bom_len..]).0;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use chrono::NaiveDate;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::{NamedTempFile, TempDir};

    fn sensor() -> SensorKey {
        SensorKey::new("Gothenburg", "femman")
    }

    fn write_csv(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_file_warns_with_sensor() {
        let dir = TempDir::new().unwrap();
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let records = tracing::subscriber::with_default(subscriber, || {
            load_observed_air_quality(
                &dir.path().join("haga.csv"),
                &SensorKey::new("Gothenburg", "haga"),
                MissingValuePolicy::Drop,
            )
        })
        .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(records.is_empty());
        assert!(output.contains("WARN"));
        assert!(output.contains("Observed pm2_5 CSV not found"));
        assert!(output.contains("Gothenburg/haga"));
        assert!(output.contains("haga.csv"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let records = load_observed_air_quality(
            &dir.path().join("nope.csv"),
            &sensor(),
            MissingValuePolicy::Drop,
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_aliases_and_bom() {
        let file = write_csv(b"\xEF\xBB\xBF Date ,PM2.5,no2\n2024-01-10,12.5,3\n2024-01-11,,4\n");
        let records = load_observed_air_quality(file.path(), &sensor(), MissingValuePolicy::Drop).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(records[0].pm2_5, 12.5);
        assert_eq!(records[0].source, AirQualitySource::Observed);
    }

    #[test]
    fn test_forward_fill_policy() {
        let file = write_csv(b"day,median\n2024-01-10,12\n2024-01-11,NaN\n");
        let records = load_observed_air_quality(file.path(), &sensor(), MissingValuePolicy::ForwardFill).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].pm2_5, 12.0);
    }

    #[test]
    fn test_windows_1252_header() {
        // "Mätstation" in Windows-1252 is not valid UTF-8
        let file = write_csv(b"date,pm25,M\xE4tstation\n2024-01-10,8,Femman\n");
        let records = load_observed_air_quality(file.path(), &sensor(), MissingValuePolicy::Drop).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_unknown_columns_are_schema_mismatch() {
        let file = write_csv(b"when,what\n2024-01-10,8\n");
        let err = load_observed_air_quality(file.path(), &sensor(), MissingValuePolicy::Drop).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_unparsable_date_is_schema_mismatch() {
        let file = write_csv(b"date,pm25\nyesterday,8\n");
        let err = load_observed_air_quality(file.path(), &sensor(), MissingValuePolicy::Drop).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }
}
