//! Tabular output of lookup results.

use camino::Utf8Path;
use rust_xlsxwriter::{Format, FormatBorder, Workbook, XlsxError};

use crate::client::IpRecord;
use crate::error::{Error, Result};

/// Output columns, in order.
pub const COLUMNS: [&str; 6] = ["IP", "Country", "Region", "City", "ISP", "Timezone"];

/// Worksheet name used for the results.
pub const SHEET_NAME: &str = "IP Details";

/// Ordered lookup results, one per processed input row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputTable {
    records: Vec<IpRecord>,
}

/// Arrange records into an [`OutputTable`], preserving their order.
pub fn format(records: Vec<IpRecord>) -> OutputTable {
    OutputTable { records }
}

impl OutputTable {
    #[inline]
    pub fn records(&self) -> &[IpRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Data rows as cells in [`COLUMNS`] order. Missing fields are `None`.
    pub fn rows(&self) -> impl Iterator<Item = [Option<&str>; 6]> + '_ {
        self.records.iter().map(|r| {
            [
                Some(r.ip.as_str()).filter(|ip| !ip.is_empty()),
                r.country.as_deref(),
                r.region.as_deref(),
                r.city.as_deref(),
                r.isp.as_deref(),
                r.timezone.as_deref(),
            ]
        })
    }

    /// Write the table as a single-sheet xlsx workbook.
    ///
    /// Every cell of the header and data grid gets a thin border, including
    /// cells left blank by a failed lookup.
    pub fn write_xlsx(&self, path: &Utf8Path) -> Result<()> {
        self.build_workbook()
            .and_then(|mut workbook| workbook.save(path))
            .map_err(|source| Error::Write {
                path: path.to_owned(),
                source,
            })
    }

    fn build_workbook(&self) -> std::result::Result<Workbook, XlsxError> {
        let mut workbook = Workbook::new();
        let border = Format::new().set_border(FormatBorder::Thin);
        let header = Format::new().set_border(FormatBorder::Thin).set_bold();

        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        for (col, name) in COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
        }

        for (i, cells) in self.rows().enumerate() {
            let row = (i + 1) as u32;
            for (col, cell) in cells.iter().enumerate() {
                match cell {
                    Some(value) => {
                        sheet.write_string_with_format(row, col as u16, *value, &border)?
                    }
                    None => sheet.write_blank(row, col as u16, &border)?,
                };
            }
        }

        sheet.autofit();
        Ok(workbook)
    }
}
