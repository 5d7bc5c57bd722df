use serde_json::{Map, Value};
use std::io;

use super::{cell, flatten};

type StdoutCsv = csv::Writer<io::StdoutLock<'static>>;

/// Write output as CSV to stdout.
///
/// Record arrays become one row per record; a single result object becomes
/// `field,value` pairs with nested keys flattened.
pub fn print_csv(value: &Value) {
    let mut wtr = csv::Writer::from_writer(io::stdout().lock());

    let outcome = match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => write_fields(&mut wtr, result),
            Some(Value::Array(rows)) => write_rows(&mut wtr, rows),
            _ => write_fields(&mut wtr, map),
        },
        Value::Array(rows) => write_rows(&mut wtr, rows),
        _ => wtr.write_record([cell(value)]),
    };

    if let Err(e) = outcome.and_then(|()| wtr.flush().map_err(csv::Error::from)) {
        eprintln!("CSV output error: {}", e);
    }
}

fn write_fields(wtr: &mut StdoutCsv, map: &Map<String, Value>) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in flatten(map) {
        wtr.write_record([key, cell(&val)])?;
    }
    Ok(())
}

fn write_rows(wtr: &mut StdoutCsv, rows: &[Value]) -> csv::Result<()> {
    let records: Vec<Vec<(String, Value)>> = rows
        .iter()
        .filter_map(|row| row.as_object().map(flatten))
        .collect();
    let Some(first) = records.first() else {
        for row in rows {
            wtr.write_record([cell(row)])?;
        }
        return Ok(());
    };

    let headers: Vec<String> = first.iter().map(|(k, _)| k.clone()).collect();
    wtr.write_record(&headers)?;
    for record in &records {
        let row: Vec<String> = headers
            .iter()
            .map(|h| {
                record
                    .iter()
                    .find(|(k, _)| k == h)
                    .map(|(_, v)| cell(v))
                    .unwrap_or_default()
            })
            .collect();
        wtr.write_record(&row)?;
    }
    Ok(())
}
