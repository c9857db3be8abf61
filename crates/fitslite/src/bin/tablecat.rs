use std::process;

use fitslite::table::ColumnData;
use fitslite::texttable::{read_table, ReadOptions};

fn parse_line_number(value: Option<&String>, flag: &str) -> Result<usize, String> {
    let raw = value.ok_or_else(|| format!("{} requires a value", flag))?;
    raw.parse::<usize>()
        .map_err(|_| format!("{}: not a line number: {}", flag, raw))
}

fn preview(column: &ColumnData, limit: usize) -> String {
    let cells: Vec<String> = match column {
        ColumnData::Text(v) => v.iter().take(limit).cloned().collect(),
        ColumnData::Integer(v) => v.iter().take(limit).map(|n| n.to_string()).collect(),
        ColumnData::Float(v) => v.iter().take(limit).map(|f| f.to_string()).collect(),
    };
    let ellipsis = if column.len() > limit { ", ..." } else { "" };
    format!("[{}{}]", cells.join(", "), ellipsis)
}

fn run(args: &[String]) -> Result<String, String> {
    let mut opts = ReadOptions::default();
    let mut file_path = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--header-line" => {
                opts.header_line = parse_line_number(args.get(i + 1), "--header-line")?;
                i += 2;
            }
            "--data-start" => {
                opts.data_start = parse_line_number(args.get(i + 1), "--data-start")?;
                i += 2;
            }
            "--delimiter" => {
                let raw = args
                    .get(i + 1)
                    .ok_or_else(|| String::from("--delimiter requires a value"))?;
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => opts.delimiter = Some(c),
                    _ => return Err(format!("--delimiter: expected one character, got {:?}", raw)),
                }
                i += 2;
            }
            arg if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            arg => {
                if file_path.is_some() {
                    return Err(String::from("expected exactly one file argument"));
                }
                file_path = Some(arg.to_string());
                i += 1;
            }
        }
    }

    let path = file_path.ok_or_else(|| {
        String::from("usage: tablecat FILE [--header-line N] [--data-start N] [--delimiter C]")
    })?;
    let table = read_table(&path, &opts).map_err(|e| e.to_string())?;

    let mut out = format!("{} rows x {} columns\n", table.n_rows(), table.n_columns());
    for name in table.names() {
        let column = table.column(name).map_err(|e| e.to_string())?;
        out.push_str(&format!(
            "  {} ({}): {}\n",
            name,
            column.type_name(),
            preview(column, 5)
        ));
    }
    Ok(out)
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(out) => print!("{}", out),
        Err(e) => {
            eprintln!("tablecat: {}", e);
            process::exit(1);
        }
    }
}
