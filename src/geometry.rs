use crate::{Result, TallyError};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const MIN_COLUMNS: usize = 11;

/// One scintillator layer as described by the geometry CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub copy_number: i32,
    /// Readout face direction (0-3)
    pub readout_face: i32,
    pub scint_material: String,
    pub scint_light_yield: f64,
    pub scint_length_mm: f64,
    pub scint_width_mm: f64,
    pub scint_height_mm: f64,
    pub coating_thickness_nm: f64,
    pub coating_material: String,
    pub fiber_core_diameter_um: f64,
    pub fiber_cladding_diameter_um: f64,
}

impl LayerInfo {
    /// Layer height including the coating on both faces.
    pub fn stacked_height_mm(&self) -> f64 {
        self.scint_height_mm + 2.0 * self.coating_thickness_nm * 1e-6
    }
}

/// The layer stack. Copy numbers are always `1..=len()`.
#[derive(Debug, Clone)]
pub struct LayerGeometry {
    layers: BTreeMap<i32, LayerInfo>,
}

fn parse_field<T: FromStr>(row: &[&str], column: usize, name: &str, line_no: usize) -> Result<T> {
    let raw = row[column].trim();
    raw.parse::<T>().map_err(|_| {
        TallyError::Geometry(format!("line {}: invalid {} '{}'", line_no, name, raw))
    })
}

impl LayerGeometry {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TallyError::Geometry(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Parse the geometry CSV. The first line is a header and is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate();
        if let Some((_, header)) = lines.next() {
            tracing::debug!(header, "Reading scintillator geometry");
        }

        let mut layers = BTreeMap::new();
        for (idx, line) in lines {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let row: Vec<&str> = trimmed.split(',').collect();
            if row.len() < MIN_COLUMNS {
                tracing::warn!(line = line_no, content = trimmed, "Skipping malformed geometry row");
                continue;
            }

            let layer = LayerInfo {
                copy_number: parse_field(&row, 0, "copynumber", line_no)?,
                readout_face: parse_field(&row, 1, "readout_face", line_no)?,
                scint_material: row[2].trim().to_string(),
                scint_light_yield: parse_field(&row, 3, "scint_lightyield", line_no)?,
                scint_length_mm: parse_field(&row, 4, "scint_length", line_no)?,
                scint_width_mm: parse_field(&row, 5, "scint_width", line_no)?,
                scint_height_mm: parse_field(&row, 6, "scint_height", line_no)?,
                coating_thickness_nm: parse_field(&row, 7, "coating_thickness", line_no)?,
                coating_material: row[8].trim().to_string(),
                fiber_core_diameter_um: parse_field(&row, 9, "fiber_core_diameter", line_no)?,
                fiber_cladding_diameter_um: parse_field(&row, 10, "fiber_cladding_diameter", line_no)?,
            };

            let copy_number = layer.copy_number;
            if layers.insert(copy_number, layer).is_some() {
                return Err(TallyError::Geometry(format!(
                    "copynumber {} appears more than once",
                    copy_number
                )));
            }
        }

        if layers.is_empty() {
            return Err(TallyError::Geometry("no valid layers found".to_string()));
        }

        // Copy numbers must be consecutive natural numbers starting at 1
        for (expected, &found) in (1..).zip(layers.keys()) {
            if found != expected {
                return Err(TallyError::Geometry(format!(
                    "expected copynumber {} but found {}; copynumbers must run 1..=N without gaps",
                    expected, found
                )));
            }
        }

        tracing::info!(layers = layers.len(), "Loaded scintillator layers");
        Ok(Self { layers })
    }

    /// Copy numbers in ascending order.
    pub fn copy_numbers(&self) -> Vec<i32> {
        self.layers.keys().copied().collect()
    }

    pub fn layer(&self, copy_number: i32) -> Option<&LayerInfo> {
        self.layers.get(&copy_number)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> impl Iterator<Item = &LayerInfo> {
        self.layers.values()
    }

    /// Height of the whole stack, gaps between adjacent layers included.
    pub fn total_stack_height_mm(&self, gap_mm: f64) -> f64 {
        let layers: f64 = self.layers.values().map(LayerInfo::stacked_height_mm).sum();
        let gaps = self.layers.len().saturating_sub(1) as f64 * gap_mm;
        layers + gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "copynumber,readout_face,scint_material,scint_lightyield,scint_length,scint_width,scint_height,coating_thickness,coating_material,fiber_core_diameter,fiber_cladding_diameter";

    fn row(copy: i32) -> String {
        format!("{},0,LYSO,27000,50,50,10,100,Teflon,940,1000", copy)
    }

    #[test]
    fn test_parse_sorts_copy_numbers() {
        let text = format!("{}\n{}\n{}\n{}\n", HEADER, row(2), row(3), row(1));
        let geometry = LayerGeometry::parse(&text).unwrap();
        assert_eq!(geometry.copy_numbers(), vec![1, 2, 3]);
        let layer = geometry.layer(2).unwrap();
        assert_eq!(layer.scint_material, "LYSO");
        assert_eq!(layer.coating_material, "Teflon");
        assert_eq!(layer.scint_height_mm, 10.0);
    }

    #[test]
    fn test_skips_comments_blank_and_short_rows() {
        let text = format!("{}\n# comment\n\n{}\n1,2,3\n", HEADER, row(1));
        let geometry = LayerGeometry::parse(&text).unwrap();
        assert_eq!(geometry.len(), 1);
    }

    #[test]
    fn test_gap_in_copy_numbers_rejected() {
        let text = format!("{}\n{}\n{}\n", HEADER, row(1), row(3));
        assert!(matches!(LayerGeometry::parse(&text), Err(TallyError::Geometry(_))));
    }

    #[test]
    fn test_must_start_at_one() {
        let text = format!("{}\n{}\n", HEADER, row(2));
        assert!(LayerGeometry::parse(&text).is_err());
    }

    #[test]
    fn test_duplicate_copy_number_rejected() {
        let text = format!("{}\n{}\n{}\n", HEADER, row(1), row(1));
        assert!(LayerGeometry::parse(&text).is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(LayerGeometry::parse(HEADER).is_err());
        assert!(LayerGeometry::parse("").is_err());
    }

    #[test]
    fn test_bad_number_reports_line() {
        let text = format!("{}\n1,0,LYSO,abc,50,50,10,100,Teflon,940,1000\n", HEADER);
        let err = LayerGeometry::parse(&text).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_total_stack_height() {
        let text = format!("{}\n{}\n{}\n", HEADER, row(1), row(2));
        let geometry = LayerGeometry::parse(&text).unwrap();
        // 2 * (10mm + 2 * 100nm) + 1 * 0.5mm gap
        let expected = 2.0 * (10.0 + 2.0 * 100.0 * 1e-6) + 0.5;
        assert!((geometry.total_stack_height_mm(0.5) - expected).abs() < 1e-12);
    }
}
