use itertools::Itertools;

use super::{Result, sheet::Sheet};
use crate::db::model::accession::{MAPPING_BATCH_SIZE, NewMapping};

/// Converts the selected columns of a decoded sheet into mapping rows.
///
/// Rows whose barcode cell trims to empty are skipped outright; they are not
/// an error, and they do not shift the content of later rows. A row with a
/// barcode but no genotype is kept, since genotypes can be filled in later.
/// An empty sheet yields an empty vec.
pub fn build_mappings(
    sheet: &Sheet,
    barcode_column: &str,
    genotype_column: &str,
) -> Result<Vec<NewMapping>> {
    let barcode_idx = sheet.column_index(barcode_column)?;
    let genotype_idx = sheet.column_index(genotype_column)?;

    let mappings = sheet
        .rows
        .iter()
        .filter_map(|row| {
            let plant_barcode = row[barcode_idx].trim();
            if plant_barcode.is_empty() {
                return None;
            }

            Some(NewMapping {
                plant_barcode: plant_barcode.to_string(),
                genotype_id: row[genotype_idx].trim().to_string(),
            })
        })
        .collect();

    Ok(mappings)
}

/// Partitions mappings into insert batches, preserving row order across
/// chunk boundaries.
pub fn into_batches(mappings: Vec<NewMapping>) -> Vec<Vec<NewMapping>> {
    mappings
        .into_iter()
        .chunks(MAPPING_BATCH_SIZE)
        .into_iter()
        .map(Iterator::collect)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::import::Error;

    fn sheet(rows: Vec<Vec<&str>>) -> Sheet {
        Sheet {
            name: "Sheet1".to_string(),
            headers: vec!["PlantBarcode".to_string(), "GenotypeID".to_string()],
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(ToString::to_string).collect())
                .collect(),
        }
    }

    #[test]
    fn values_are_trimmed_and_blank_barcodes_skipped() {
        let sheet = sheet(vec![
            vec![" PLANT_001 ", " GT-1 "],
            vec!["   ", "GT-ORPHANED"],
            vec!["PLANT_002", ""],
            vec!["PLANT_003", "GT-3"],
        ]);

        let mappings = build_mappings(&sheet, "PlantBarcode", "GenotypeID").unwrap();

        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[0].plant_barcode, "PLANT_001");
        assert_eq!(mappings[0].genotype_id, "GT-1");
        // The blank-barcode row does not shift later rows
        assert_eq!(mappings[1].plant_barcode, "PLANT_002");
        assert_eq!(mappings[1].genotype_id, "");
        assert_eq!(mappings[2].plant_barcode, "PLANT_003");
    }

    #[test]
    fn empty_sheet_is_a_valid_degenerate_case() {
        let mappings = build_mappings(&sheet(vec![]), "PlantBarcode", "GenotypeID").unwrap();
        assert_eq!(mappings, vec![]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let err = build_mappings(&sheet(vec![]), "Barcode?", "GenotypeID").unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound { .. }));
    }

    #[test]
    fn batches_of_100_preserve_row_order() {
        let mappings: Vec<_> = (0..250)
            .map(|i| NewMapping {
                plant_barcode: format!("PLANT_{i:04}"),
                genotype_id: format!("GT{i}"),
            })
            .collect();

        let batches = into_batches(mappings);

        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(batches[0][0].plant_barcode, "PLANT_0000");
        assert_eq!(batches[1][0].plant_barcode, "PLANT_0100");
        assert_eq!(batches[2][49].plant_barcode, "PLANT_0249");
    }
}
