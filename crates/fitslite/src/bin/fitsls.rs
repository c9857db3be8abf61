use std::process;

use fitslite::fitsfile::FitsFile;

fn run(args: &[String]) -> Result<String, String> {
    let mut file_path = None;

    for arg in args {
        if arg.starts_with('-') {
            return Err(format!("Unknown option: {}", arg));
        }
        if file_path.is_some() {
            return Err(String::from("expected exactly one file argument"));
        }
        file_path = Some(arg.clone());
    }

    let path = file_path.ok_or_else(|| String::from("usage: fitsls FILE"))?;
    let file = FitsFile::open(&path).map_err(|e| e.to_string())?;

    let mut out = String::new();
    for summary in file.list_units().map_err(|e| e.to_string())? {
        out.push_str(&summary.to_string());
        out.push('\n');
    }
    Ok(out)
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(out) => print!("{}", out),
        Err(e) => {
            eprintln!("fitsls: {}", e);
            process::exit(1);
        }
    }
}
