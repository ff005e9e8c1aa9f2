use super::StatementRow;
use crate::error::{MarketError, Result};
use std::io::Read;

/// Reads a previously exported wallet statement.
///
/// Wraps `csv::Reader` with whitespace trimming so hand-edited files still
/// parse.
pub struct StatementReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> StatementReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows in file order.
    pub fn rows(self) -> impl Iterator<Item = Result<StatementRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(MarketError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coins::Coins;
    use crate::domain::transaction::TransactionType;
    use rust_decimal_macros::dec;

    const HEADER: &str = "id,createdAt,type,amount,balanceAfter,description,sessionId";

    #[test]
    fn test_reader_valid_rows() {
        let data = format!(
            "{HEADER}\n\
             6f1c2b1e-8a57-4c43-9d44-0a8f2d0c7e11, 2030-01-01T10:00:00Z, credit, 100, 100, Purchased 100 coins,\n\
             0d5b1f7e-2c4a-4f7e-a8a0-51e3a1d5b6c2, 2030-01-01T12:00:00Z, debit, 50, 50, Skill exchange session, 3c9f1c8e-1b2d-4e5f-8a9b-0c1d2e3f4a5b"
        );
        let rows: Vec<Result<StatementRow>> = StatementReader::new(data.as_bytes()).rows().collect();

        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.r#type, TransactionType::Credit);
        assert_eq!(first.balance_after, Coins::new(dec!(100)));
        assert!(first.session_id.is_none());
        assert!(rows[1].as_ref().unwrap().session_id.is_some());
    }

    #[test]
    fn test_reader_malformed_row() {
        let data = format!(
            "{HEADER}\n6f1c2b1e-8a57-4c43-9d44-0a8f2d0c7e11,2030-01-01T10:00:00Z,refund,1,1,x,"
        );
        let rows: Vec<Result<StatementRow>> = StatementReader::new(data.as_bytes()).rows().collect();
        assert!(rows[0].is_err());
    }
}
