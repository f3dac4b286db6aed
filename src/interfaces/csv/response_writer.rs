use crate::domain::batch::BatchSummary;
use crate::domain::transaction::TransactionResponse;
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ResponseRecord<'a> {
    stan: u32,
    r#type: String,
    response_code: &'a str,
    approved: bool,
    approved_amount: Option<Decimal>,
    host_reference: Option<&'a str>,
    response_message: Option<&'a str>,
}

/// Writes host responses, and optionally the batch close summary, as CSV.
pub struct ResponseWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_response(&mut self, response: &TransactionResponse) -> Result<()> {
        self.writer.serialize(ResponseRecord {
            stan: response.stan,
            r#type: response.r#type.to_string(),
            response_code: response.response_code.code(),
            approved: response.response_code.is_approved(),
            approved_amount: response.approved_amount.map(Decimal::from),
            host_reference: response.host_reference.as_deref(),
            response_message: response.response_message.as_deref(),
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Consumes the writer and emits the summary as a separate CSV table.
    pub fn finish_with_summary(self, summary: &BatchSummary) -> Result<W> {
        let mut writer = csv::Writer::from_writer(self.into_inner()?);
        writer.serialize(summary)?;
        writer
            .into_inner()
            .map_err(|e| GatewayError::from(e.into_error()))
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| GatewayError::from(e.into_error()))
    }
}
