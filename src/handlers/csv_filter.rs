use crate::{
    errors::{AppError, AppResult},
    ops::{
        registry::{Args, OperationHandler},
        types::{OperationKind, Outcome, PathParam, Row},
    },
    sandbox::{PathGuard, PathIntent},
};
use async_trait::async_trait;
use std::io::Read;

const PATH_PARAMS: &[PathParam] = &[PathParam { name: "file_path", intent: PathIntent::Existing }];

pub struct CsvFilter;

fn csv_error(e: csv::Error) -> AppError {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => AppError::from_read(io),
            other => AppError::Internal(format!("{other:?}")),
        }
    } else {
        AppError::UnsupportedFormat(format!("malformed delimited data: {e}"))
    }
}

fn parse_delimiter(raw: Option<&str>) -> AppResult<u8> {
    match raw {
        None => Ok(b','),
        Some("\\t") | Some("\t") => Ok(b'\t'),
        Some(s) if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        Some(_) => Err(AppError::InvalidArgument("delimiter must be a single ASCII character".into())),
    }
}

/// Rows whose `column` equals `value` exactly, in file order.
/// Fails with `MissingColumn` when the header has no such column.
pub fn select<R: Read>(input: R, delimiter: u8, column: &str, value: &str) -> AppResult<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(input);
    let columns = columns(reader.headers().map_err(csv_error)?);
    let filter = columns
        .iter()
        .position(|(name, _)| name == column)
        .ok_or_else(|| AppError::MissingColumn(column.to_string()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        if field(&record, &columns[filter].1) != Some(value) {
            continue;
        }
        let fields = columns
            .iter()
            .map(|(name, idxs)| (name.clone(), field(&record, idxs).map(str::to_string)))
            .collect();
        rows.push(Row(fields));
    }
    Ok(rows)
}

/// Distinct header names in first-seen order, each with every index it occupies.
fn columns(headers: &csv::StringRecord) -> Vec<(String, Vec<usize>)> {
    let mut out: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        match out.iter_mut().find(|(name, _)| name == h) {
            Some((_, idxs)) => idxs.push(i),
            None => out.push((h.to_string(), vec![i])),
        }
    }
    out
}

// a repeated header takes the value of its last column present in the record
fn field<'r>(record: &'r csv::StringRecord, idxs: &[usize]) -> Option<&'r str> {
    idxs.iter().rev().find_map(|&i| record.get(i))
}

#[async_trait]
impl OperationHandler for CsvFilter {
    fn kind(&self) -> OperationKind { OperationKind::FilterCsv }
    fn path_params(&self) -> &'static [PathParam] { PATH_PARAMS }
    fn params(&self) -> &'static [&'static str] { &["column", "value", "delimiter"] }

    async fn execute(&self, _guard: &PathGuard, args: Args) -> AppResult<Outcome> {
        let source = args.path("file_path")?.clone();
        let column = args.param("column")?.to_string();
        let value = args.param("value")?.to_string();
        let delimiter = parse_delimiter(args.optional("delimiter"))?;

        let selected = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(source.as_path()).map_err(AppError::from_read)?;
            select(std::io::BufReader::new(file), delimiter, &column, &value)
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

        match selected {
            Ok(rows) => Ok(Outcome::Rows(rows)),
            Err(AppError::MissingColumn(col)) => {
                tracing::debug!(column = %col, "column absent from header, no rows match");
                Ok(Outcome::Rows(Vec::new()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PEOPLE: &str = "name,age\nAnn,30\nBo,40\n";

    fn args(guard: &PathGuard, file: &str, pairs: &[(&str, &str)]) -> Args {
        let p = guard.validate(file, PathIntent::Existing).unwrap();
        let params = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Args::new(HashMap::from([("file_path", p)]), params)
    }

    fn rows(out: Outcome) -> Vec<Row> {
        match out {
            Outcome::Rows(r) => r,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn selects_exact_matches_in_order() {
        let data = "name,age\nAnn,30\nBo,40\nann,31\nAnn,32\n";
        let got = select(data.as_bytes(), b',', "name", "Ann").unwrap();
        let ages: Vec<_> = got.iter().map(|r| r.get("age").unwrap()).collect();
        assert_eq!(ages, vec!["30", "32"]);
    }

    #[test]
    fn values_are_compared_as_strings() {
        let data = "id,score\n1,7\n2,07\n3,7.0\n";
        let got = select(data.as_bytes(), b',', "score", "7").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].get("id"), Some("1"));
    }

    #[test]
    fn missing_column_is_reported_to_caller() {
        let err = select(PEOPLE.as_bytes(), b',', "email", "x").unwrap_err();
        assert!(matches!(err, AppError::MissingColumn(ref c) if c == "email"));
    }

    #[test]
    fn short_records_yield_null_fields() {
        let data = "a,b,c\n1,2\n";
        let got = select(data.as_bytes(), b',', "a", "1").unwrap();
        assert_eq!(serde_json::to_string(&got).unwrap(), r#"[{"a":"1","b":"2","c":null}]"#);
    }

    #[test]
    fn repeated_header_uses_last_column() {
        let data = "a,b,a\n1,2,3\n4,5\n";
        let got = select(data.as_bytes(), b',', "a", "3").unwrap();
        assert_eq!(serde_json::to_string(&got).unwrap(), r#"[{"a":"3","b":"2"}]"#);
        assert!(select(data.as_bytes(), b',', "a", "1").unwrap().is_empty());
        // short record: the last present column wins
        let got = select(data.as_bytes(), b',', "a", "4").unwrap();
        assert_eq!(got, vec![Row(vec![("a".into(), Some("4".into())), ("b".into(), Some("5".into()))])]);
    }

    #[test]
    fn delimiters() {
        assert_eq!(parse_delimiter(None).unwrap(), b',');
        assert_eq!(parse_delimiter(Some(";")).unwrap(), b';');
        assert_eq!(parse_delimiter(Some("\\t")).unwrap(), b'\t');
        assert!(parse_delimiter(Some(";;")).is_err());
        let got = select("x;y\n1;2\n".as_bytes(), b';', "y", "2").unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn filters_people_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("people.csv"), PEOPLE).unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let query = [("column", "name"), ("value", "Bo")];
        let first = rows(CsvFilter.execute(&guard, args(&guard, "people.csv", &query)).await.unwrap());
        let second = rows(CsvFilter.execute(&guard, args(&guard, "people.csv", &query)).await.unwrap());
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0], Row(vec![("name".into(), Some("Bo".into())), ("age".into(), Some("40".into()))]));
        assert_eq!(std::fs::read_to_string(tmp.path().join("people.csv")).unwrap(), PEOPLE);
    }

    #[tokio::test]
    async fn absent_column_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("people.csv"), PEOPLE).unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let out = CsvFilter
            .execute(&guard, args(&guard, "people.csv", &[("column", "email"), ("value", "x")]))
            .await
            .unwrap();
        assert!(rows(out).is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.csv"), b"name\n\xff\xfe\n").unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let err = CsvFilter
            .execute(&guard, args(&guard, "bad.csv", &[("column", "name"), ("value", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat(_)), "{err:?}");
    }
}
