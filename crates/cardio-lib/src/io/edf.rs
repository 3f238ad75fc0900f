use crate::signal::{lead_name, Lead, Recording};
use anyhow::{anyhow, Result};
use edf_reader::file_reader::SyncFileReader;
use edf_reader::sync_reader::SyncEDFReader;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Helper implementing the EDF reader trait for on-disk files.
struct DiskFileReader {
    path: PathBuf,
}

impl SyncFileReader for DiskFileReader {
    fn read(&self, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Load every channel of an EDF file; all channels must share one sampling rate.
pub fn load_edf_recording(path: &Path) -> Result<Recording> {
    let reader = SyncEDFReader::init_with_file_reader(DiskFileReader {
        path: path.to_path_buf(),
    })?;
    let header = &reader.edf_header;
    if header.channels.is_empty() {
        return Err(anyhow!("EDF file {} has no channels", path.display()));
    }
    let rate = |samples_per_record: u64| {
        samples_per_record as f64 * 1000.0 / header.block_duration as f64
    };
    let fs = rate(header.channels[0].number_of_samples_in_data_record);
    if let Some(other) = header
        .channels
        .iter()
        .map(|c| rate(c.number_of_samples_in_data_record))
        .find(|r| (r - fs).abs() > f64::EPSILON)
    {
        return Err(anyhow!(
            "EDF channels use different sampling rates ({fs} Hz and {other} Hz)"
        ));
    }

    let total_duration = header.block_duration * header.number_of_blocks;
    let data = reader.read_data_window(0, total_duration)?;
    let labels: Vec<&str> = header.channels.iter().map(|c| c.label.trim()).collect();
    let leads = labels
        .iter()
        .zip(data)
        .enumerate()
        .map(|(i, (&label, samples))| {
            let shared = labels.iter().filter(|&&other| other == label).count() > 1;
            let name = match label {
                "" => lead_name(i),
                _ if shared => format!("{label}_{}", i + 1),
                _ => label.to_string(),
            };
            Lead {
                name,
                data: samples.iter().map(|&value| value as f64).collect(),
            }
        })
        .collect();
    Ok(Recording { fs, leads })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Channel {
        label: &'static str,
        samples_per_record: usize,
    }

    fn field(out: &mut Vec<u8>, value: &str, width: usize) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(width, b' ');
        out.extend_from_slice(&bytes);
    }

    /// EDF file with 1 s records; digital range maps onto +-3.2768 mV.
    fn write_edf(path: &Path, channels: &[Channel], records: &[Vec<Vec<i16>>]) {
        let ns = channels.len();
        let mut out = Vec::new();
        field(&mut out, "0", 8);
        field(&mut out, "X X X X", 80);
        field(&mut out, "Startdate X X X X", 80);
        field(&mut out, "01.01.20", 8);
        field(&mut out, "00.00.00", 8);
        field(&mut out, &(256 * (ns + 1)).to_string(), 8);
        field(&mut out, "", 44);
        field(&mut out, &records.len().to_string(), 8);
        field(&mut out, "1", 8);
        field(&mut out, &ns.to_string(), 4);
        let per_channel = |out: &mut Vec<u8>, width: usize, value: &dyn Fn(&Channel) -> String| {
            for channel in channels {
                field(out, &value(channel), width);
            }
        };
        per_channel(&mut out, 16, &|c| c.label.to_string());
        per_channel(&mut out, 80, &|_| "AgAgCl electrode".into());
        per_channel(&mut out, 8, &|_| "mV".into());
        per_channel(&mut out, 8, &|_| "-3.2768".into());
        per_channel(&mut out, 8, &|_| "3.2767".into());
        per_channel(&mut out, 8, &|_| "-32768".into());
        per_channel(&mut out, 8, &|_| "32767".into());
        per_channel(&mut out, 80, &|_| "HP:0.1Hz".into());
        per_channel(&mut out, 8, &|c| c.samples_per_record.to_string());
        per_channel(&mut out, 32, &|_| String::new());
        assert_eq!(out.len(), 256 * (ns + 1));
        for record in records {
            for (channel, samples) in channels.iter().zip(record) {
                assert_eq!(samples.len(), channel.samples_per_record);
                for sample in samples {
                    out.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
        std::fs::write(path, out).unwrap();
    }

    fn ramp(start: i16, len: usize) -> Vec<i16> {
        (0..len as i16).map(|i| start + 10 * i).collect()
    }

    #[test]
    fn channels_become_scaled_named_leads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecg.edf");
        let channels = [
            Channel { label: "II", samples_per_record: 250 },
            Channel { label: "V1", samples_per_record: 250 },
        ];
        let records = vec![
            vec![ramp(0, 250), ramp(-5000, 250)],
            vec![ramp(10000, 250), vec![0; 250]],
        ];
        write_edf(&path, &channels, &records);

        let recording = load_edf_recording(&path).unwrap();
        assert_eq!(recording.fs, 250.0);
        let names: Vec<_> = recording.leads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["II", "V1"]);
        assert!(recording.leads.iter().all(|l| l.data.len() == 500));

        // one digital step is 0.1 uV
        let ii = &recording.leads[0].data;
        assert!(ii[0].abs() < 1e-3, "{}", ii[0]);
        assert!((ii[1] - 1e-3).abs() < 1e-4, "{}", ii[1]);
        assert!((ii[250] - 1.0).abs() < 1e-3, "{}", ii[250]);
        let v1 = &recording.leads[1].data;
        assert!((v1[0] + 0.5).abs() < 1e-3, "{}", v1[0]);
        assert!(v1[250..].iter().all(|v| v.abs() < 1e-3));
    }

    #[test]
    fn mixed_sampling_rates_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.edf");
        let channels = [
            Channel { label: "ECG", samples_per_record: 250 },
            Channel { label: "Resp", samples_per_record: 125 },
        ];
        write_edf(&path, &channels, &[vec![vec![0; 250], vec![0; 125]]]);
        let err = load_edf_recording(&path).unwrap_err();
        assert!(err.to_string().contains("different sampling rates"), "{err}");
    }

    #[test]
    fn blank_and_repeated_labels_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.edf");
        let channels = [
            Channel { label: "ECG", samples_per_record: 100 },
            Channel { label: "", samples_per_record: 100 },
            Channel { label: "ECG", samples_per_record: 100 },
        ];
        write_edf(&path, &channels, &[vec![vec![0; 100]; 3]]);
        let recording = load_edf_recording(&path).unwrap();
        assert_eq!(recording.fs, 100.0);
        let names: Vec<_> = recording.leads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["ECG_1", "lead2", "ECG_3"]);
    }
}
