use serde::Serialize;

const BARCODE_HINTS: [&str; 3] = ["barcode", "plant", "qr"];
const GENOTYPE_HINTS: [&str; 3] = ["genotype", "line", "accession"];

/// Best-guess header indices for the two import roles. Advisory only: the
/// import endpoint requires both columns named explicitly, so a suggestion
/// never satisfies that precondition on its own.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnRoles {
    pub barcode: Option<usize>,
    pub genotype: Option<usize>,
}

/// Case-insensitive substring matching against a small synonym set. Never
/// assigns the same column to both roles; the barcode role wins a contested
/// header.
pub fn infer_columns(headers: &[String]) -> ColumnRoles {
    let barcode = find_hinted(headers, &BARCODE_HINTS, None);
    let genotype = find_hinted(headers, &GENOTYPE_HINTS, barcode);

    ColumnRoles { barcode, genotype }
}

fn find_hinted(headers: &[String], hints: &[&str], taken: Option<usize>) -> Option<usize> {
    headers.iter().enumerate().position(|(i, header)| {
        let header = header.to_lowercase();

        Some(i) != taken && hints.iter().any(|hint| header.contains(hint))
    })
}
