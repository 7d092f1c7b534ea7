//! livesheet_engine - Spreadsheet formula engine.
//!
//! Cells live in a [`engine::Sheet`]; formulas are evaluated at write time
//! by an [`engine::Evaluator`] that resolves references against the sheet
//! and calls into [`builtins`].

pub mod builtins;
pub mod engine;
pub mod error;

#[cfg(test)]
mod tests {
    use crate::builtins::{FixedClock, SeededRandom};
    use crate::engine::*;
    use crate::error::FormulaError;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn value(sheet: &Sheet, address: &str) -> Value {
        sheet
            .get(address)
            .unwrap()
            .map(|cell| cell.value.clone())
            .unwrap_or(Value::Empty)
    }

    fn error() -> Value {
        Value::Error(CellError::Error)
    }

    #[test]
    fn test_sum_over_range() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "1").unwrap();
        sheet.set("A2", "2").unwrap();
        sheet.set("A3", "3").unwrap();
        sheet.set("B1", "=SUM(A1:A3)").unwrap();
        assert_eq!(value(&sheet, "B1"), Value::Number(6.0));
        assert_eq!(sheet.get("B1").unwrap().unwrap().value.to_string(), "6");
    }

    #[test]
    fn test_range_text_coerces_to_zero() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "10").unwrap();
        sheet.set("A2", "abc").unwrap();
        sheet.set("B1", "=SUM(A1:A2)").unwrap();
        sheet.set("B2", "=AVERAGE(A1:A3)").unwrap();
        sheet.set("B3", "=COUNT(A1:A5)").unwrap();
        assert_eq!(value(&sheet, "B1"), Value::Number(10.0));
        assert_eq!(value(&sheet, "B2"), Value::Number(5.0));
        assert_eq!(value(&sheet, "B3"), Value::Number(2.0));
    }

    #[test]
    fn test_average_of_empty_range_is_error() {
        let mut sheet = Sheet::default();
        sheet.set("B1", "=AVERAGE(A1:A3)").unwrap();
        assert_eq!(value(&sheet, "B1"), error());
    }

    #[test]
    fn test_unterminated_call_is_error() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "=SUM(").unwrap();
        let cell = sheet.get("A1").unwrap().unwrap();
        assert_eq!(cell.value, error());
        assert_eq!(cell.formula.as_deref(), Some("=SUM("));
        assert_eq!(cell.value.to_string(), "#ERROR");
    }

    #[test]
    fn test_text_references_are_quoted() {
        let mut sheet = Sheet::default();
        sheet.set("A1", r#"say "hi""#).unwrap();
        sheet.set("A2", "=UPPER(A1)").unwrap();
        sheet.set("A3", "=LEN(A1) + A4").unwrap();
        assert_eq!(value(&sheet, "A2"), Value::Text(r#"SAY "HI""#.to_string()));
        assert_eq!(value(&sheet, "A3"), Value::Number(8.0));
    }

    #[test]
    fn test_boolean_references_feed_if() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "true").unwrap();
        sheet.set("A2", "=IF(A1, \"on\", \"off\")").unwrap();
        assert_eq!(value(&sheet, "A2"), Value::Text("on".to_string()));
    }

    #[test]
    fn test_error_references_propagate() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "=1/0").unwrap();
        sheet.set("A2", "=A1+1").unwrap();
        sheet.set("A3", "=SUM(A1:A1)").unwrap();
        assert_eq!(value(&sheet, "A2"), error());
        assert_eq!(value(&sheet, "A3"), error());
    }

    #[test]
    fn test_no_reactive_recompute() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "1").unwrap();
        sheet.set("B1", "=A1+1").unwrap();
        assert_eq!(value(&sheet, "B1"), Value::Number(2.0));

        sheet.set("A1", "10").unwrap();
        assert_eq!(value(&sheet, "B1"), Value::Number(2.0));
    }

    #[test]
    fn test_rewriting_literal_input_is_idempotent() {
        let mut sheet = Sheet::default();
        let format = CellFormat {
            bold: Some(true),
            color: Some("#336699".to_string()),
            alignment: Some(Alignment::Center),
            ..CellFormat::default()
        };
        let inputs = [
            ("A1", " 42 "),
            ("A2", "true"),
            ("A3", "hello, world"),
            ("A4", "2024-03-01"),
            ("A5", "-1.5e3"),
        ];

        for (address, raw) in inputs {
            let at: CellRef = address.parse().unwrap();
            sheet.set_cell_format(at, &format);
            sheet.set_cell_raw_input(at, raw);
            let before = sheet.get_cell(&at).unwrap().clone();

            sheet.set_cell_raw_input(at, &before.input_text());
            let after = sheet.get_cell(&at).unwrap();
            assert_eq!(after.value, before.value, "{}", address);
            assert_eq!(after.kind, before.kind, "{}", address);
            assert_eq!(after.format, format, "{}", address);
            assert_eq!(after.formula, None);
        }
        assert_eq!(value(&sheet, "A1"), Value::Number(42.0));
        assert_eq!(value(&sheet, "A2"), Value::Bool(true));
    }

    #[test]
    fn test_references_outside_sheet_read_zero() {
        let mut sheet = Sheet::new("s", "S", 5, 5);
        sheet.set("A1", "=Z99 + 1").unwrap();
        assert_eq!(value(&sheet, "A1"), Value::Number(1.0));
    }

    #[test]
    fn test_nesting_and_length_limits() {
        let mut sheet = Sheet::default();
        let deep = format!("={}1{}", "(".repeat(200), ")".repeat(200));
        sheet.set("A1", &deep).unwrap();
        assert_eq!(value(&sheet, "A1"), error());

        let long = format!("={}", "1+".repeat(3000) + "1");
        sheet.set("A2", &long).unwrap();
        assert_eq!(value(&sheet, "A2"), error());

        let evaluator = Evaluator::default();
        assert_eq!(
            evaluator.try_evaluate(&deep, &sheet),
            Err(FormulaError::TooDeep(64))
        );
    }

    #[test]
    fn test_long_sum_chain_within_limits() {
        let mut sheet = Sheet::default();
        sheet.set("A1", &format!("={}1", "1+".repeat(2047))).unwrap();
        assert_eq!(value(&sheet, "A1"), Value::Number(2048.0));

        sheet.set("A2", "4").unwrap();
        sheet.set("A3", &format!("={}A2", "A2-".repeat(1000))).unwrap();
        assert_eq!(value(&sheet, "A3"), Value::Number(-3996.0));
    }

    #[test]
    fn test_recalculate_marks_cycles_circular() {
        let mut sheet = Sheet::default();
        sheet.set("A1", "=A1+1").unwrap();
        assert_eq!(value(&sheet, "A1"), Value::Number(1.0));
        sheet.recalculate();
        assert_eq!(value(&sheet, "A1"), Value::Error(CellError::Circular));
        assert_eq!(sheet.get("A1").unwrap().unwrap().value.to_string(), "#CIRCULAR");
    }

    #[test]
    fn test_ports_make_impure_builtins_deterministic() {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        let evaluator = |seed| {
            Arc::new(Evaluator::with_ports(
                Arc::new(clock),
                Arc::new(SeededRandom::new(seed)),
            ))
        };

        let mut first = Sheet::default().with_evaluator(evaluator(42));
        let mut second = Sheet::default().with_evaluator(evaluator(42));
        for sheet in [&mut first, &mut second] {
            sheet.set("A1", "=NOW()").unwrap();
            sheet.set("A2", "=TODAY()").unwrap();
            sheet.set("A3", "=RAND()").unwrap();
        }

        assert_eq!(
            value(&first, "A1"),
            Value::Text("2024-01-02T03:04:05.000Z".to_string())
        );
        assert_eq!(value(&first, "A2"), Value::Text("2024-01-02".to_string()));
        assert_eq!(value(&first, "A3"), value(&second, "A3"));
        match value(&first, "A3") {
            Value::Number(n) => assert!((0.0..1.0).contains(&n)),
            other => panic!("RAND returned {:?}", other),
        }
    }
}
