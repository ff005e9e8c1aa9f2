use super::StatementRow;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use std::io::Write;

/// Writes ledger transactions as statement rows.
pub struct StatementWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> StatementWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header even when `transactions` is empty.
    pub fn write_statement<'a>(
        &mut self,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Result<()> {
        let mut wrote_any = false;
        for tx in transactions {
            self.writer.serialize(StatementRow::from(tx))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "id",
                "createdAt",
                "type",
                "amount",
                "balanceAfter",
                "description",
                "sessionId",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
