//! Reading the input tables.
//!
//! A [`Workbook`] maps sheet names to row-major grids of cells. It can be read from a
//! spreadsheet (`.xlsx`, `.xls`, `.ods`), from a directory with one `<Sheet>.csv` per table
//! or from a JSON object of sheet name to rows. Spreadsheet and CSV sheets start with a header
//! row, which is skipped.

use std::collections::BTreeMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, info};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::problem::{CostEntry, CostTable, ObjectiveKind, Problem};

/// One cell of a sheet
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Interprets a textual cell, as found in CSV files
    fn parse(text: &str) -> Cell {
        let text = text.trim();
        if text.is_empty() {
            Cell::Empty
        } else {
            match text.parse::<f64>() {
                Ok(value) => Cell::Number(value),
                Err(_) => Cell::Text(text.to_string()),
            }
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(value) => Cell::Number(*value as f64),
            Data::Float(value) => Cell::Number(*value),
            Data::Bool(value) => Cell::Number(if *value { 1.0 } else { 0.0 }),
            Data::Empty => Cell::Empty,
            other => Cell::parse(&other.to_string()),
        }
    }
}

/// The rows of a sheet, header excluded
pub type Sheet = Vec<Vec<Cell>>;

/// Sheet names are matched ignoring whitespace and ASCII case
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Drops trailing empty cells of every row and trailing empty rows
fn trim(mut sheet: Sheet) -> Sheet {
    for row in sheet.iter_mut() {
        while row.last().map_or(false, Cell::is_empty) {
            row.pop();
        }
    }
    while sheet.last().map_or(false, Vec::is_empty) {
        sheet.pop();
    }
    sheet
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    /// Sheets by normalized name, along with the name as written in the source
    sheets: BTreeMap<String, (String, Sheet)>,
}

impl Workbook {
    pub fn from_sheets(sheets: impl IntoIterator<Item = (String, Sheet)>) -> Workbook {
        Workbook {
            sheets: sheets
                .into_iter()
                .map(|(name, sheet)| (normalize(&name), (name, trim(sheet))))
                .collect(),
        }
    }

    /// Reads a workbook, picking the format from the path
    pub fn open(path: &Path) -> Result<Workbook> {
        if !path.exists() {
            return Err(Error::access(path, "no such file or directory"));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let workbook = if path.is_dir() {
            Self::read_csv_dir(path)?
        } else if extension == "json" {
            Self::read_json(path)?
        } else {
            Self::read_spreadsheet(path)?
        };

        info!("Loaded {} sheets from {}", workbook.sheets.len(), path.display());
        Ok(workbook)
    }

    fn read_spreadsheet(path: &Path) -> Result<Workbook> {
        let mut workbook = open_workbook_auto(path).map_err(|e| Error::access(path, e))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| Error::format(&name, e.to_string()))?;
            let rows: Sheet = range
                .rows()
                .skip(1)
                .map(|row| row.iter().map(Cell::from).collect())
                .collect();
            debug!("sheet `{}`: {} rows", name, rows.len());
            sheets.push((name, rows));
        }
        Ok(Workbook::from_sheets(sheets))
    }

    fn read_csv_dir(path: &Path) -> Result<Workbook> {
        let entries = std::fs::read_dir(path).map_err(|e| Error::access(path, e))?;

        let mut sheets = Vec::new();
        for entry in entries {
            let file = entry.map_err(|e| Error::access(path, e))?.path();
            let is_csv = file
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
            let name = match file.file_stem().and_then(|s| s.to_str()) {
                Some(name) if is_csv => name.to_string(),
                _ => continue,
            };

            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(&file)
                .map_err(|e| Error::access(&file, e))?;

            let mut rows = Sheet::new();
            for record in reader.records() {
                let record = record.map_err(|e| Error::format(&name, e.to_string()))?;
                rows.push(record.iter().map(Cell::parse).collect());
            }
            debug!("sheet `{}`: {} rows", name, rows.len());
            sheets.push((name, rows));
        }
        Ok(Workbook::from_sheets(sheets))
    }

    fn read_json(path: &Path) -> Result<Workbook> {
        let file = std::fs::File::open(path).map_err(|e| Error::access(path, e))?;
        let reader = std::io::BufReader::new(file);
        let sheets: BTreeMap<String, Sheet> = serde_json::from_reader(reader)
            .map_err(|e| Error::format(&path.display().to_string(), e.to_string()))?;
        Ok(Workbook::from_sheets(sheets))
    }

    /// The names of the sheets, as written in the source
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.values().map(|(name, _)| name.as_str())
    }

    pub fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheets
            .get(&normalize(name))
            .map(|(_, sheet)| sheet)
            .ok_or_else(|| Error::format(name, "sheet is missing"))
    }

    /// The sheet as a rectangular grid of numbers
    pub fn numeric(&self, name: &str) -> Result<Vec<Vec<f64>>> {
        let sheet = self.sheet(name)?;
        let width = sheet.first().map_or(0, Vec::len);

        let mut table = Vec::with_capacity(sheet.len());
        for (r, row) in sheet.iter().enumerate() {
            if row.len() != width {
                return Err(Error::format(
                    name,
                    format!("row {} has {} cells, expected {}", r + 1, row.len(), width),
                ));
            }
            let values = row
                .iter()
                .enumerate()
                .map(|(c, cell)| match cell {
                    Cell::Number(value) => Ok(*value),
                    Cell::Empty => Err(Error::format(name, format!("empty cell at row {}, column {}", r + 1, c + 1))),
                    Cell::Text(text) => Err(Error::format(
                        name,
                        format!("`{}` at row {}, column {} is not a number", text, r + 1, c + 1),
                    )),
                })
                .collect::<Result<Vec<f64>>>()?;
            table.push(values);
        }
        Ok(table)
    }

    /// The cost table: one `label, unit cost, priority, weight` row per objective
    pub fn costs(&self) -> Result<CostTable> {
        const SHEET: &str = "Cost";
        let sheet = self.sheet(SHEET)?;
        let mut entries: [Option<CostEntry>; 5] = [None; 5];

        for (r, row) in sheet.iter().enumerate() {
            let number = |c: usize| match row.get(c) {
                Some(Cell::Number(value)) => Ok(*value),
                _ => Err(Error::format(
                    SHEET,
                    format!("row {} needs a number in column {}", r + 1, c + 1),
                )),
            };

            let kind: ObjectiveKind = match row.first() {
                Some(Cell::Text(label)) => label.parse().map_err(|e: String| Error::format(SHEET, e))?,
                _ => return Err(Error::format(SHEET, format!("row {} has no label", r + 1))),
            };
            if row.len() != 4 {
                return Err(Error::format(
                    SHEET,
                    format!("row {} has {} cells, expected 4", r + 1, row.len()),
                ));
            }

            let priority = number(2)?;
            if priority.fract() != 0.0 || priority.abs() > i32::MAX as f64 {
                return Err(Error::format(
                    SHEET,
                    format!("priority {} of {} is not an integer", priority, kind),
                ));
            }

            let slot = &mut entries[kind.index()];
            if slot.is_some() {
                return Err(Error::format(SHEET, format!("{} is listed twice", kind)));
            }
            *slot = Some(CostEntry {
                unit_cost: number(1)?,
                priority: priority as i32,
                weight: number(3)?,
            });
        }

        let mut table = [CostEntry {
            unit_cost: 0.0,
            priority: 0,
            weight: 0.0,
        }; 5];
        for kind in ObjectiveKind::ALL {
            table[kind.index()] =
                entries[kind.index()].ok_or_else(|| Error::format(SHEET, format!("{} is missing", kind)))?;
        }
        Ok(CostTable::new(table))
    }
}

impl Problem {
    /// Builds a validated instance from the five input sheets
    pub fn from_workbook(workbook: &Workbook) -> Result<Problem> {
        Problem::new(
            workbook.numeric("ProductionRate")?,
            workbook.numeric("YieldRate")?,
            workbook.numeric("SetupTime")?,
            workbook.numeric("Demand")?,
            workbook.costs()?,
        )
    }

    /// Reads and validates an instance
    pub fn load(path: &Path) -> Result<Problem> {
        let problem = Problem::from_workbook(&Workbook::open(path)?)?;
        info!(
            "Read instance with {} machines, {} parts and {} weeks",
            problem.machines(),
            problem.parts(),
            problem.weeks()
        );
        Ok(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{MachineIndex, PartIndex, WeekIndex};
    use std::io::Write;

    const COSTS: &str = "Objective,Cost,Priority,Weight\nTime,10,1,1\nMachine,5,1,1\nPersonnel,3,1,0.5\nPenalty,100,5,1\nInventory,1,0,1\n";

    fn write(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn csv_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Production Rate.csv", "Part 1,Part 2\n2,0\n1,3\n");
        write(dir.path(), "YieldRate.csv", "Part 1,Part 2\n1,0.5\n");
        write(dir.path(), "SetupTime.csv", "Part 1,Part 2\n1,2\n1,2\n");
        write(dir.path(), "Demand.csv", "Part 1,Part 2\n5,1\n3,1\n,\n");
        write(dir.path(), "Cost.csv", COSTS);
        write(dir.path(), "notes.txt", "ignored");
        dir
    }

    #[test]
    fn csv_directory_loads_into_a_problem() {
        let dir = csv_dir();
        let problem = Problem::load(dir.path()).unwrap();

        assert_eq!(problem.machines(), 2);
        assert_eq!(problem.parts(), 2);
        assert_eq!(problem.weeks(), 2);
        assert_eq!(problem.production_rate(MachineIndex::from(1), PartIndex::from(1)), 3.0);
        assert_eq!(problem.yield_rate(PartIndex::from(1)), 0.5);
        assert_eq!(problem.demand(WeekIndex::from(1), PartIndex::from(0)), 3.0);

        let penalty = problem.costs().get(ObjectiveKind::Penalty);
        assert_eq!(penalty.unit_cost, 100.0);
        assert_eq!(penalty.priority, 5);
        assert_eq!(problem.costs().get(ObjectiveKind::Personnel).weight, 0.5);
    }

    #[test]
    fn json_sheets_have_no_header() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "ProductionRate": [[2]],
                "YieldRate": [[1]],
                "SetupTime": [[1]],
                "Demand": [[5], [3]],
                "Cost": [["Time", 1, 1, 1], ["Machine", 1, 1, 1], ["Personnel", 1, 1, 1],
                         ["Penalty", 1, 5, 1], ["Inventory", 1, 0, 1]]
            }}"#
        )
        .unwrap();

        let problem = Problem::load(file.path()).unwrap();
        assert_eq!(problem.weeks(), 2);
        assert_eq!(problem.total_demand(PartIndex::from(0)), 8.0);
    }

    #[test]
    fn missing_source_is_an_access_error() {
        let err = Problem::load(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(matches!(err, Error::DataAccess { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn text_in_a_numeric_sheet_is_rejected() {
        let dir = csv_dir();
        write(dir.path(), "SetupTime.csv", "Part 1,Part 2\n1,two\n1,2\n");

        let err = Problem::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::DataFormat { ref sheet, .. } if sheet == "SetupTime"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = csv_dir();
        write(dir.path(), "Demand.csv", "Part 1,Part 2\n5,1\n3\n");

        let err = Problem::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::DataFormat { ref sheet, .. } if sheet == "Demand"));
    }

    #[test]
    fn missing_sheet_is_reported() {
        let dir = csv_dir();
        std::fs::remove_file(dir.path().join("Demand.csv")).unwrap();

        let err = Problem::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::DataFormat { ref sheet, .. } if sheet == "Demand"));
    }

    #[test]
    fn cost_rows_are_checked() {
        let sheet = |rows: Vec<Vec<Cell>>| Workbook::from_sheets(vec![("Cost".to_string(), rows)]);
        let row = |label: &str, priority: f64| {
            vec![
                Cell::Text(label.to_string()),
                Cell::Number(1.0),
                Cell::Number(priority),
                Cell::Number(1.0),
            ]
        };
        let all = |priority: f64| -> Vec<Vec<Cell>> {
            ObjectiveKind::ALL.iter().map(|k| row(&k.to_string(), priority)).collect()
        };

        assert!(sheet(all(1.0)).costs().is_ok());
        assert!(sheet(all(1.5)).costs().is_err());

        let mut duplicated: Vec<Vec<Cell>> = all(1.0);
        duplicated.push(row("time", 2.0));
        assert!(sheet(duplicated).costs().is_err());

        let mut missing: Vec<Vec<Cell>> = all(1.0);
        missing.pop();
        assert!(sheet(missing).costs().is_err());

        let mut unknown: Vec<Vec<Cell>> = all(1.0);
        unknown.push(row("Overtime", 1.0));
        assert!(sheet(unknown).costs().is_err());
    }

    #[test]
    fn sheet_names_ignore_spacing_and_case() {
        let workbook = Workbook::from_sheets(vec![(
            "Production Rate".to_string(),
            vec![vec![Cell::Number(1.0)], vec![Cell::Empty]],
        )]);

        assert_eq!(workbook.numeric("productionrate").unwrap(), vec![vec![1.0]]);
        assert_eq!(workbook.sheet_names().collect::<Vec<_>>(), vec!["Production Rate"]);
    }
}
