use async_trait::async_trait;
use fw_observe::{DirectoryObserver, ObserveError, ScanReport};
use fw_schemas::{Instrument, RunFile};

use crate::ports::RunObserver;

/// Filesystem walks run on the blocking pool so a slow NFS mount never
/// stalls the runtime's worker threads.
#[async_trait]
impl RunObserver for DirectoryObserver {
    async fn scan(&self, instrument: &Instrument) -> Result<ScanReport, ObserveError> {
        let observer = self.clone();
        let inst = instrument.clone();
        tokio::task::spawn_blocking(move || observer.scan(&inst))
            .await
            .map_err(|e| join_failure(instrument, e))?
    }

    async fn list(&self, instrument: &Instrument) -> Result<Vec<RunFile>, ObserveError> {
        let observer = self.clone();
        let inst = instrument.clone();
        tokio::task::spawn_blocking(move || observer.list(&inst))
            .await
            .map_err(|e| join_failure(instrument, e))?
    }
}

fn join_failure(instrument: &Instrument, e: tokio::task::JoinError) -> ObserveError {
    ObserveError::DirectoryUnavailable {
        path: instrument.watch_dir.clone(),
        reason: format!("scan task failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn instrument(root: &std::path::Path) -> Instrument {
        Instrument {
            id: "MARI".to_string(),
            watch_dir: root.join("data"),
            control_file: root.join("lastrun.txt"),
            file_prefix: "MAR".to_string(),
            file_extension: "nxs".to_string(),
            destination: "watched-files".to_string(),
        }
    }

    #[tokio::test]
    async fn async_scan_matches_blocking_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let inst = instrument(tmp.path());
        fs::create_dir_all(&inst.watch_dir).unwrap();
        for seq in [5, 6, 7] {
            fs::write(inst.watch_dir.join(format!("MAR{seq:05}.nxs")), b"").unwrap();
        }
        fs::write(&inst.control_file, "MAR 00006 0\n").unwrap();

        let observer = DirectoryObserver::default();
        let report = RunObserver::scan(&observer, &inst).await.unwrap();

        assert_eq!(report, observer.scan(&inst).unwrap());
        assert_eq!(report.control_sequence, Some(6));
        assert_eq!(report.highest_sequence(), Some(6));
    }
}
