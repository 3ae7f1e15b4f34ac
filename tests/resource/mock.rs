use log::LevelFilter;
use marrow::{Error, Executor, Result, RowLabeled, RowsAffected, Value};
use std::{collections::VecDeque, env, future::Future, sync::Arc};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger.is_test(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

pub enum Reply {
    Rows(Vec<RowLabeled>),
    Affected(RowsAffected),
}

/// Scripted stand-in for the external query-execution layer: replies are
/// consumed in order and every statement is recorded for assertions.
#[derive(Default)]
pub struct MockExecutor {
    replies: VecDeque<Reply>,
    pub statements: Vec<String>,
}

pub fn rows(labels: &[&str], values: &[&[Value]]) -> Vec<RowLabeled> {
    let labels: Arc<[String]> = labels.iter().map(|v| v.to_string()).collect();
    values
        .iter()
        .map(|row| RowLabeled::new(labels.clone(), row.to_vec().into_boxed_slice()))
        .collect()
}

impl MockExecutor {
    pub fn new() -> Self {
        init_logs();
        Self::default()
    }

    pub fn reply_rows(&mut self, labels: &[&str], values: &[&[Value]]) -> &mut Self {
        self.replies.push_back(Reply::Rows(rows(labels, values)));
        self
    }

    pub fn reply_affected(&mut self, rows_affected: u64, last_insert_id: Option<i64>) -> &mut Self {
        self.replies.push_back(Reply::Affected(RowsAffected {
            rows_affected,
            last_insert_id,
        }));
        self
    }

}

impl Executor for MockExecutor {
    fn fetch(&mut self, sql: String) -> impl Future<Output = Result<Vec<RowLabeled>>> + Send {
        self.statements.push(sql);
        let reply = self.replies.pop_front();
        async move {
            match reply {
                Some(Reply::Rows(rows)) => Ok(rows),
                Some(Reply::Affected(..)) => Err(Error::msg("fetch received a modify reply")),
                None => Err(Error::msg("no scripted reply left")),
            }
        }
    }

    fn execute(&mut self, sql: String) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.statements.push(sql);
        let reply = self.replies.pop_front();
        async move {
            match reply {
                Some(Reply::Affected(affected)) => Ok(affected),
                Some(Reply::Rows(..)) => Err(Error::msg("execute received a row reply")),
                None => Err(Error::msg("no scripted reply left")),
            }
        }
    }
}
