//! Writing a solved schedule to disk: a `results.xlsx` workbook with one sheet per table, the
//! same tables as CSV files and a `results.json` holding all of them.

use std::path::Path;

use log::info;
use ndarray::{Array2, Array3};
use rust_xlsxwriter::Workbook;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::schedule::{ObjectiveValue, ScheduleResult};
use crate::parse::Cell;

/// Name of the sheet and file stem holding the ranked objective values
pub const OBJECTIVES_SHEET: &str = "optimal solution";
pub const OBJECTIVES_FILE: &str = "optimal_solution.csv";
pub const WORKBOOK_FILE: &str = "results.xlsx";
pub const JSON_FILE: &str = "results.json";

type Rows = Vec<Vec<Cell>>;

fn text(value: impl Into<String>) -> Cell {
    Cell::Text(value.into())
}

fn labels(prefix: &str, count: usize) -> impl Iterator<Item = Cell> + '_ {
    (1..=count).map(move |i| text(format!("{} {}", prefix, i)))
}

fn nested2(table: &Array2<f64>) -> Vec<Vec<f64>> {
    table.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn nested3(table: &Array3<f64>) -> Vec<Vec<Vec<f64>>> {
    table.outer_iter().map(|block| nested2(&block.to_owned())).collect()
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    objectives: &'a [ObjectiveValue],
    /// `[week][machine][part]`
    n: Vec<Vec<Vec<f64>>>,
    b: Vec<Vec<Vec<f64>>>,
    c: Vec<Vec<Vec<f64>>>,
    a: Vec<Vec<Vec<f64>>>,
    c_plus: Vec<Vec<Vec<f64>>>,
    c_minus: Vec<Vec<Vec<f64>>>,
    /// `[week][machine]`
    h: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
    e: Vec<Vec<f64>>,
    x: Vec<Vec<f64>>,
    /// `[week]`
    w: Vec<f64>,
    /// `[week][part]`
    p: Vec<Vec<f64>>,
    t: Vec<Vec<f64>>,
}

impl<'a> From<&'a ScheduleResult> for ResultsFile<'a> {
    fn from(result: &'a ScheduleResult) -> Self {
        ResultsFile {
            objectives: &result.objectives,
            n: nested3(&result.n),
            b: nested3(&result.b),
            c: nested3(&result.c),
            a: nested3(&result.a),
            c_plus: nested3(&result.c_plus),
            c_minus: nested3(&result.c_minus),
            h: nested2(&result.h),
            v: nested2(&result.v),
            e: nested2(&result.e),
            x: nested2(&result.x),
            w: result.w.to_vec(),
            p: nested2(&result.p),
            t: nested2(&result.t),
        }
    }
}

fn objective_rows(objectives: &[ObjectiveValue]) -> Rows {
    let header: Vec<Cell> = ["Objective", "Priority", "Weight", "Value"].into_iter().map(text).collect();
    std::iter::once(header)
        .chain(objectives.iter().map(|o| {
            vec![
                text(o.kind.to_string()),
                Cell::Number(o.priority as f64),
                Cell::Number(o.weight),
                Cell::Number(o.value),
            ]
        }))
        .collect()
}

/// One row per week with a leading `Week k` label
fn weekly_rows(table: &Array2<f64>, column: &str) -> Rows {
    let header: Vec<Cell> = std::iter::once(Cell::Empty).chain(labels(column, table.ncols())).collect();

    let mut rows = vec![header];
    for (k, row) in table.rows().into_iter().enumerate() {
        let mut line = vec![text(format!("Week {}", k + 1))];
        line.extend(row.iter().map(|value| Cell::Number(*value)));
        rows.push(line);
    }
    rows
}

/// One block of machine rows per week, the week repeated in a trailing column
fn block_rows(table: &Array3<f64>) -> Rows {
    let mut header: Vec<Cell> = std::iter::once(Cell::Empty).chain(labels("Part", table.shape()[2])).collect();
    header.push(text("Week"));

    let mut rows = vec![header];
    for (k, block) in table.outer_iter().enumerate() {
        for (i, row) in block.rows().into_iter().enumerate() {
            let mut line = vec![text(format!("Machine {}", i + 1))];
            line.extend(row.iter().map(|value| Cell::Number(*value)));
            line.push(Cell::Number((k + 1) as f64));
            rows.push(line);
        }
    }
    rows
}

/// Every table of the result as `(name, rows)`, the objectives first
fn tables(result: &ScheduleResult) -> Vec<(&'static str, Rows)> {
    let mut tables = vec![(OBJECTIVES_SHEET, objective_rows(&result.objectives))];
    for (name, table) in result.slot_tables() {
        tables.push((name, block_rows(table)));
    }
    for (name, table) in result.machine_tables() {
        tables.push((name, weekly_rows(table, "Machine")));
    }
    let w = result.w.clone().insert_axis(ndarray::Axis(1));
    tables.push(("w", weekly_rows(&w, "w")));
    for (name, table) in result.part_tables() {
        tables.push((name, weekly_rows(table, "Part")));
    }
    tables
}

fn field(cell: &Cell) -> String {
    match cell {
        Cell::Number(value) => value.to_string(),
        Cell::Text(text) => text.clone(),
        Cell::Empty => String::new(),
    }
}

/// Writes rows of cells to a CSV file
fn write_csv(path: &Path, rows: &Rows) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::output(path, e))?;
    for row in rows {
        writer
            .write_record(row.iter().map(field))
            .map_err(|e| Error::output(path, e))?;
    }
    writer.flush().map_err(|e| Error::output(path, e))
}

/// Writes every table as a sheet of one workbook
fn write_workbook(path: &Path, tables: &[(&str, Rows)]) -> Result<()> {
    let mut workbook = Workbook::new();
    for (name, rows) in tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).map_err(|e| Error::output(path, e))?;
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell {
                    Cell::Number(value) => sheet.write_number(r, c, *value),
                    Cell::Text(value) => sheet.write_string(r, c, value.as_str()),
                    Cell::Empty => continue,
                }
                .map_err(|e| Error::output(path, e))?;
            }
        }
    }
    workbook.save(path).map_err(|e| Error::output(path, e))
}

/// Writes every table of the result into `dir`, creating it when needed
pub fn write_results(result: &ScheduleResult, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::output(dir, e))?;

    let tables = tables(result);
    write_workbook(&dir.join(WORKBOOK_FILE), &tables)?;
    for (name, rows) in &tables {
        let file = if *name == OBJECTIVES_SHEET {
            OBJECTIVES_FILE.to_string()
        } else {
            format!("{}.csv", name)
        };
        write_csv(&dir.join(file), rows)?;
    }

    let path = dir.join(JSON_FILE);
    let file = std::fs::File::create(&path).map_err(|e| Error::output(&path, e))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &ResultsFile::from(result))
        .map_err(|e| Error::output(&path, e))?;

    info!("Wrote results to {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ObjectiveKind;
    use ndarray::{Array1, Array3};

    fn result() -> ScheduleResult {
        // 2 weeks, 2 machines, 1 part
        let slots = Array3::from_shape_vec((2, 2, 1), vec![3.0, 0.0, 2.0, 1.0]).unwrap();
        let machines = Array2::from_shape_vec((2, 2), vec![4.0, 0.0, 3.0, 1.5]).unwrap();
        let parts = Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap();

        ScheduleResult {
            objectives: vec![ObjectiveValue {
                kind: ObjectiveKind::Penalty,
                priority: 5,
                weight: 1.0,
                value: 1.0,
            }],
            n: slots.clone(),
            b: slots.mapv(|n| if n > 0.0 { 1.0 } else { 0.0 }),
            c: slots.clone(),
            c_plus: slots.clone(),
            c_minus: slots.clone(),
            a: slots,
            h: machines.clone(),
            v: machines.clone(),
            e: machines.clone(),
            x: machines,
            w: Array1::from(vec![0.0, 1.5]),
            p: parts.clone(),
            t: parts,
        }
    }

    #[test]
    fn every_table_gets_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        write_results(&result(), &out).unwrap();

        for name in ["n", "b", "c", "a", "c_plus", "c_minus", "h", "v", "e", "x", "w", "p", "t"] {
            assert!(out.join(format!("{}.csv", name)).exists(), "{} is missing", name);
        }

        let objectives = std::fs::read_to_string(out.join(OBJECTIVES_FILE)).unwrap();
        assert_eq!(objectives, "Objective,Priority,Weight,Value\nPenalty,5,1,1\n");
    }

    #[test]
    fn weekly_blocks_are_labelled_from_one() {
        let dir = tempfile::tempdir().unwrap();
        write_results(&result(), dir.path()).unwrap();

        let n = std::fs::read_to_string(dir.path().join("n.csv")).unwrap();
        let lines: Vec<&str> = n.lines().collect();
        assert_eq!(lines[0], ",Part 1,Week");
        assert_eq!(lines[1], "Machine 1,3,1");
        assert_eq!(lines[4], "Machine 2,1,2");

        let h = std::fs::read_to_string(dir.path().join("h.csv")).unwrap();
        assert_eq!(h.lines().nth(2), Some("Week 2,3,1.5"));
    }

    #[test]
    fn json_mirrors_the_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_results(&result(), dir.path()).unwrap();

        let file = std::fs::File::open(dir.path().join(JSON_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_reader(file).unwrap();
        assert_eq!(json["n"][1][0][0], 2.0);
        assert_eq!(json["w"][1], 1.5);
        assert_eq!(json["objectives"][0]["kind"], "Penalty");
    }

    #[test]
    fn workbook_has_a_sheet_per_table() {
        use calamine::{open_workbook_auto, Data, Reader};

        let dir = tempfile::tempdir().unwrap();
        write_results(&result(), dir.path()).unwrap();

        let mut workbook = open_workbook_auto(dir.path().join(WORKBOOK_FILE)).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            vec![OBJECTIVES_SHEET, "n", "b", "c", "a", "c_plus", "c_minus", "h", "v", "e", "x", "w", "p", "t"]
        );

        let objectives = workbook.worksheet_range(OBJECTIVES_SHEET).unwrap();
        assert_eq!(objectives.get((1, 0)), Some(&Data::String("Penalty".to_string())));
        assert_eq!(objectives.get((1, 1)), Some(&Data::Float(5.0)));

        // second week, second machine: n = 1 in the week 2 block
        let n = workbook.worksheet_range("n").unwrap();
        assert_eq!(n.get((0, 2)), Some(&Data::String("Week".to_string())));
        assert_eq!(n.get((4, 0)), Some(&Data::String("Machine 2".to_string())));
        assert_eq!(n.get((4, 1)), Some(&Data::Float(1.0)));
        assert_eq!(n.get((4, 2)), Some(&Data::Float(2.0)));

        let x = workbook.worksheet_range("x").unwrap();
        assert_eq!(x.get((0, 1)), Some(&Data::String("Machine 1".to_string())));
        assert_eq!(x.get((2, 0)), Some(&Data::String("Week 2".to_string())));
    }
}
