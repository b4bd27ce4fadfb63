use std::fmt;

use chrono::{DateTime, Utc};
use hierarchy::{BadHashes, Propagation, TerminusVector};
use serde::Serialize;

use crate::config::OutputFormat;

/// Nested text rendering of one propagation result
pub struct TextReport<'a>(pub &'a BadHashes);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        writeln!(f, "HierarchyBadHashes{{")?;
        writeln!(f, "\tTopContext: {},", b.top)?;
        writeln!(f, "\tRegionContext: [")?;
        for h in &b.regions {
            writeln!(f, "\t\t{h},")?;
        }
        writeln!(f, "\t],")?;
        writeln!(f, "\tZoneContext: [")?;
        for row in &b.zones {
            writeln!(f, "\t\t[")?;
            for h in row {
                writeln!(f, "\t\t\t{h},")?;
            }
            writeln!(f, "\t\t],")?;
        }
        writeln!(f, "\t],")?;
        writeln!(f, "}}")
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    bad_hashes: &'a BadHashes,
    top_termini: &'a TerminusVector,
    region_termini: &'a [TerminusVector],
}

pub fn render(propagation: &Propagation, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(TextReport(&propagation.bad_hashes).to_string()),
        OutputFormat::Json => {
            let report = JsonReport {
                generated_at: Utc::now(),
                bad_hashes: &propagation.bad_hashes,
                top_termini: &propagation.top_termini,
                region_termini: &propagation.region_termini,
            };
            let mut out = serde_json::to_string_pretty(&report)?;
            out.push('\n');
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarchy::Hash;

    fn h(b: u8) -> Hash {
        Hash([b; 32])
    }

    fn bad_hashes() -> BadHashes {
        BadHashes {
            top: h(1),
            regions: vec![h(2), h(3)],
            zones: vec![vec![h(4), h(5)], vec![h(6), h(7)]],
        }
    }

    fn termini(reference: Hash, fill: Hash) -> TerminusVector {
        let mut t = TerminusVector::new(2, reference);
        t.fill_remaining(fill);
        t
    }

    fn sample() -> Propagation {
        Propagation {
            bad_hashes: bad_hashes(),
            top_termini: termini(h(8), h(9)),
            region_termini: vec![termini(h(10), h(9)), termini(h(11), h(9))],
        }
    }

    #[test]
    fn test_text_report_is_nested_by_tier() {
        let out = render(&sample(), OutputFormat::Text).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "HierarchyBadHashes{");
        assert_eq!(lines[1], format!("\tTopContext: {},", h(1)));
        assert_eq!(lines[3], format!("\t\t{},", h(2)));
        assert_eq!(lines.iter().filter(|l| l.trim() == "[").count(), 2);
        assert!(out.contains(&format!("\t\t\t{},", h(7))));
        assert_eq!(*lines.last().unwrap(), "}");
    }

    #[test]
    fn test_json_report_carries_timestamp_and_hashes() {
        let out = render(&sample(), OutputFormat::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert!(v["generated_at"].is_string());
        assert_eq!(v["top"], h(1).to_hex());
        assert_eq!(v["zones"][1][0], h(6).to_hex());

        assert_eq!(v["top_termini"], serde_json::json!([h(9), h(9), h(8)]));
        assert_eq!(v["region_termini"].as_array().unwrap().len(), 2);
        assert_eq!(v["region_termini"][1][2], h(11).to_hex());

        let top_termini: TerminusVector = serde_json::from_value(v["top_termini"].clone()).unwrap();
        assert_eq!(top_termini, sample().top_termini);

        let back: BadHashes = serde_json::from_value(v).unwrap();
        assert_eq!(back, bad_hashes());
    }
}
