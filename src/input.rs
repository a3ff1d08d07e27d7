use calamine::{open_workbook_auto, Data, Reader};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

use crate::error::{Error, Result};

/// One data row of the input worksheet, rendered to strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputRow {
    cells: Vec<String>,
}

impl InputRow {
    /// Create a row from already rendered cells.
    pub fn new(cells: Vec<String>) -> Self {
        InputRow { cells }
    }

    /// The cell at `column`, or an empty string past the end of the row.
    #[inline]
    pub fn get(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// All cells of the row.
    #[inline]
    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

/// A worksheet loaded into memory: one header row plus data rows.
#[derive(Clone, Debug, Default)]
pub struct InputTable {
    source: Utf8PathBuf,
    sheet: String,
    headers: Vec<String>,
    rows: Vec<InputRow>,
}

impl fmt::Display for InputTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.source, self.sheet)
    }
}

impl InputTable {
    /// Build a table directly from headers and rows.
    ///
    /// Rows shorter than the header row are padded with empty cells.
    pub fn from_parts(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut cells| {
                if cells.len() < width {
                    cells.resize(width, String::new());
                }
                InputRow::new(cells)
            })
            .collect();
        InputTable {
            source: Utf8PathBuf::from("<memory>"),
            sheet: String::new(),
            headers,
            rows,
        }
    }

    /// Open a workbook and load a worksheet.
    ///
    /// Any format calamine detects from the extension is accepted. The
    /// first worksheet is used unless `sheet` names another one. The first
    /// row of the worksheet is taken as the header row.
    pub fn open(path: &Utf8Path, sheet: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(Error::InputNotFound {
                path: path.to_owned(),
            });
        }

        let mut workbook = open_workbook_auto(path).map_err(|source| Error::Workbook {
            path: path.to_owned(),
            source,
        })?;

        let names = workbook.sheet_names();
        let sheet_name = match sheet {
            Some(wanted) => names.iter().find(|n| n.as_str() == wanted).cloned(),
            None => names.first().cloned(),
        }
        .ok_or_else(|| Error::NoWorksheet {
            path: path.to_owned(),
            sheet: sheet.unwrap_or("<first>").to_string(),
        })?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|source| Error::Workbook {
                path: path.to_owned(),
                source,
            })?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(render_cell).collect(),
            None => {
                return Err(Error::EmptySheet {
                    path: path.to_owned(),
                    sheet: sheet_name,
                })
            }
        };
        let body: Vec<Vec<String>> = rows
            .map(|row| row.iter().map(render_cell).collect())
            .collect();

        let mut table = InputTable::from_parts(headers, body);
        table.source = path.to_owned();
        table.sheet = sheet_name;
        Ok(table)
    }

    /// Header names, in column order.
    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows, in worksheet order.
    #[inline]
    pub fn rows(&self) -> &[InputRow] {
        &self.rows
    }

    /// Iterate the values of one column, in row order.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row.get(index))
    }

    /// Name of the worksheet the table was loaded from.
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    /// Number of data rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Render a cell the way it would read in the spreadsheet, trimmed.
fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}
