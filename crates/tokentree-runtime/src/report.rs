//! History file output.
//!
//! The driver truncates the history file at start and writes every node's
//! history, in id order, when it exits.

use std::path::Path;

use tokentree_core::History;
use tokio::{fs, io::AsyncWriteExt};

/// Truncate (or create) the history file.
pub async fn reset_history_file(path: &Path) -> std::io::Result<()> {
    fs::File::create(path).await.map(drop)
}

/// Render every history into one text block, in the given order.
#[must_use]
pub fn render_all(histories: &[History]) -> String {
    histories.iter().map(History::render).collect()
}

/// Append every history to the file at `path`.
pub async fn append_histories(path: &Path, histories: &[History]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(render_all(histories).as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokentree_core::HistoryEvent;
    use tokentree_proto::NodeId;

    use super::*;

    fn history(id: u32) -> History {
        let mut history = History::new(NodeId(id));
        history.record(Duration::ZERO, HistoryEvent::Created { greedy: false });
        history.record(Duration::from_millis(1), HistoryEvent::EnteredCs);
        history
    }

    #[tokio::test]
    async fn reset_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.txt");

        fs::write(&path, "stale\n").await.unwrap();
        reset_history_file(&path).await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "");

        append_histories(&path, &[history(0), history(1)]).await.unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            text,
            "00: Node 00 created, greedy: false\n\
             00: Node 00 entered CS\n\
             01: Node 01 created, greedy: false\n\
             01: Node 01 entered CS\n"
        );
    }
}
