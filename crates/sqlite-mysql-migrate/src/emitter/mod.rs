//! Script serialization.
//!
//! The emitter writes statements to a [`ScriptSink`] strictly in script order:
//! header, DROP and CREATE statements, data inside one transaction, views,
//! triggers, deferred foreign keys, and finally the report block. What happens
//! to the bytes (file, stdout, gzip) is up to the sink.

mod ddl;

pub use ddl::{foreign_key_name, DdlGenerator, INDEX_PREFIX_LENGTH};

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::core::identifier::comment_safe;
use crate::error::Result;
use crate::report::MigrationReport;
use crate::trigger::TranslatedTrigger;

/// Sequential destination for the generated script.
pub trait ScriptSink: Send {
    /// Append text to the script.
    fn write_str(&mut self, text: &str) -> Result<()>;

    /// Flush buffered output.
    fn flush(&mut self) -> Result<()>;
}

/// [`ScriptSink`] over any [`Write`]: files, stdout, gzip encoders, buffers.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> ScriptSink for WriterSink<W> {
    fn write_str(&mut self, text: &str) -> Result<()> {
        self.inner.write_all(text.as_bytes())?;
        self.bytes_written += text.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Values written into the script header.
#[derive(Debug, Clone)]
pub struct ScriptHeader {
    pub source: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub config_hash: String,
    pub target_version: String,
}

/// Writes script sections to a sink.
pub struct ScriptEmitter<'s> {
    sink: &'s mut dyn ScriptSink,
    statements: u64,
}

impl<'s> ScriptEmitter<'s> {
    pub fn new(sink: &'s mut dyn ScriptSink) -> Self {
        Self {
            sink,
            statements: 0,
        }
    }

    /// Statements written so far.
    pub fn statements(&self) -> u64 {
        self.statements
    }

    pub fn header(&mut self, header: &ScriptHeader) -> Result<()> {
        let text = format!(
            "-- SQLite to MySQL migration script\n\
             -- Generated by {} {}\n\
             -- Source: {}\n\
             -- Generated at: {}\n\
             -- Config hash: {}\n\
             -- Target: MySQL {}\n\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            comment_safe(&header.source.display().to_string()),
            header.generated_at.to_rfc3339(),
            header.config_hash,
            header.target_version
        );
        self.sink.write_str(&text)
    }

    /// Session settings that precede every statement.
    pub fn preamble(&mut self, charset: &str) -> Result<()> {
        self.statement(&format!("SET NAMES {};", charset))?;
        self.statement("SET FOREIGN_KEY_CHECKS = 0;")
    }

    pub fn postamble(&mut self) -> Result<()> {
        self.statement("SET FOREIGN_KEY_CHECKS = 1;")
    }

    /// Section banner.
    pub fn section(&mut self, title: &str) -> Result<()> {
        self.sink.write_str(&format!("\n--\n-- {}\n--\n\n", title))
    }

    /// One complete statement, terminated by the caller.
    pub fn statement(&mut self, sql: &str) -> Result<()> {
        self.statements += 1;
        self.sink.write_str(sql)?;
        self.sink.write_str("\n")
    }

    pub fn comment(&mut self, text: &str) -> Result<()> {
        for line in text.lines() {
            self.sink.write_str(&format!("-- {}\n", line))?;
        }
        Ok(())
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.statement("START TRANSACTION;")
    }

    pub fn commit(&mut self) -> Result<()> {
        self.statement("COMMIT;")
    }

    /// Triggers inside a `DELIMITER ;;` block.
    pub fn triggers(&mut self, triggers: &[TranslatedTrigger], drop_existing: bool) -> Result<()> {
        if triggers.is_empty() {
            return Ok(());
        }
        self.sink.write_str("DELIMITER ;;\n")?;
        for trigger in triggers {
            if trigger.commented_out.is_none() {
                self.statements += 1;
            }
            self.sink.write_str(&trigger.render(drop_existing))?;
            self.sink.write_str("\n")?;
        }
        self.sink.write_str("DELIMITER ;\n")
    }

    /// Trailing report block.
    pub fn report(&mut self, report: &MigrationReport) -> Result<()> {
        self.sink.write_str("\n")?;
        self.sink.write_str(&report.render_comment_block())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportHandle;

    fn text(sink: WriterSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_writer_sink_counts_bytes() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_str("abc").unwrap();
        sink.write_str("dé").unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.bytes_written(), 6);
        assert_eq!(text(sink), "abcdé");
    }

    #[test]
    fn test_header_and_preamble() {
        let mut sink = WriterSink::new(Vec::new());
        {
            let mut emitter = ScriptEmitter::new(&mut sink);
            emitter
                .header(&ScriptHeader {
                    source: PathBuf::from("/data/app.db"),
                    generated_at: Utc::now(),
                    config_hash: "abc123".to_string(),
                    target_version: "8.0".to_string(),
                })
                .unwrap();
            emitter.preamble("utf8mb4").unwrap();
            emitter.postamble().unwrap();
            assert_eq!(emitter.statements(), 3);
        }
        let out = text(sink);
        assert!(out.starts_with("-- SQLite to MySQL migration script\n"));
        assert!(out.contains("-- Source: /data/app.db\n"));
        assert!(out.contains("-- Config hash: abc123\n"));
        assert!(out.contains("-- Target: MySQL 8.0\n"));
        assert!(out.contains("SET NAMES utf8mb4;\nSET FOREIGN_KEY_CHECKS = 0;\n"));
        assert!(out.ends_with("SET FOREIGN_KEY_CHECKS = 1;\n"));
    }

    #[test]
    fn test_header_escapes_source_path() {
        let mut sink = WriterSink::new(Vec::new());
        ScriptEmitter::new(&mut sink)
            .header(&ScriptHeader {
                source: PathBuf::from("/data/app\nDROP DATABASE prod;.db"),
                generated_at: Utc::now(),
                config_hash: "abc123".to_string(),
                target_version: "8.0".to_string(),
            })
            .unwrap();
        let out = text(sink);
        assert!(out.lines().filter(|l| !l.is_empty()).all(|l| l.starts_with("--")));
        assert!(out.contains("-- Source: /data/app\\nDROP DATABASE prod;.db\n"));
    }

    #[test]
    fn test_transaction_and_section() {
        let mut sink = WriterSink::new(Vec::new());
        {
            let mut emitter = ScriptEmitter::new(&mut sink);
            emitter.section("Data").unwrap();
            emitter.begin_transaction().unwrap();
            emitter.statement("INSERT INTO `t` (`id`) VALUES\n(1);").unwrap();
            emitter.commit().unwrap();
        }
        assert_eq!(
            text(sink),
            "\n--\n-- Data\n--\n\nSTART TRANSACTION;\nINSERT INTO `t` (`id`) VALUES\n(1);\nCOMMIT;\n"
        );
    }

    #[test]
    fn test_empty_trigger_list_writes_nothing() {
        let mut sink = WriterSink::new(Vec::new());
        ScriptEmitter::new(&mut sink).triggers(&[], true).unwrap();
        assert_eq!(sink.bytes_written(), 0);
    }

    #[test]
    fn test_report_block_is_commented() {
        let report = ReportHandle::new();
        report.register_table("t", 1);
        let mut sink = WriterSink::new(Vec::new());
        {
            let mut emitter = ScriptEmitter::new(&mut sink);
            emitter.report(&report.snapshot()).unwrap();
        }
        let out = text(sink);
        assert!(out.lines().skip(1).all(|l| l.starts_with("--")));
        assert!(out.contains("Migration report"));
    }
}
