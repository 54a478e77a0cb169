//! ポート競合のチェック

use crate::engine::ContainerEngine;
use crate::error::{ContainerError, Result};
use crate::inspector::PortInspector;
use futures_util::future::try_join_all;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// 他のプロセスに使われているポート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConflict {
    pub port: String,
    pub pid: u32,
    /// コマンドラインが取得できなかった場合は `None`
    pub cmd: Option<String>,
}

impl fmt::Display for PortConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- port {} is used by process with pid {}",
            self.port, self.pid
        )?;
        if let Some(cmd) = &self.cmd {
            write!(f, " ({})", cmd)?;
        }
        Ok(())
    }
}

pub struct PortChecker<'a, E, I> {
    engine: &'a E,
    inspector: &'a I,
}

impl<'a, E: ContainerEngine, I: PortInspector> PortChecker<'a, E, I> {
    pub fn new(engine: &'a E, inspector: &'a I) -> Self {
        Self { engine, inspector }
    }

    /// 必要なポートが他のプロセスに使われていないか確認
    ///
    /// 自プロジェクトのコンテナが公開しているポートは対象外です。
    /// 必要なポートがなければエンジンには問い合わせません。
    #[tracing::instrument(skip(self, required))]
    pub async fn check(&self, project: &str, required: &[String]) -> Result<()> {
        if required.is_empty() {
            return Ok(());
        }

        let own_ports = self.engine.published_ports(project).await?;

        let candidates: Vec<&String> = required
            .iter()
            .filter(|port| !own_ports.contains(port))
            .collect();
        debug!(required = ?required, candidates = ?candidates, "Checking ports");

        let lookups = candidates.iter().map(|port| async move {
            let pid = self.inspector.listener_pid(port).await?;
            Ok::<_, ContainerError>(pid.map(|pid| (port.to_string(), pid)))
        });
        let listeners: Vec<(String, u32)> =
            try_join_all(lookups).await?.into_iter().flatten().collect();

        if listeners.is_empty() {
            return Ok(());
        }

        let mut pids: Vec<u32> = listeners.iter().map(|(_, pid)| *pid).collect();
        pids.sort_unstable();
        pids.dedup();

        let infos = try_join_all(pids.iter().map(|pid| self.inspector.process_info(*pid))).await?;
        let commands: HashMap<u32, String> = pids
            .iter()
            .zip(infos)
            .filter_map(|(pid, info)| Some((*pid, info?.cmd)))
            .collect();

        let conflicts = listeners
            .into_iter()
            .map(|(port, pid)| PortConflict {
                cmd: commands.get(&pid).cloned(),
                port,
                pid,
            })
            .collect();

        Err(ContainerError::PortsAllocated(conflicts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::ProcessInfo;

    #[derive(Default)]
    struct FakeEngine {
        own_ports: Vec<String>,
        unreachable: bool,
    }

    impl ContainerEngine for FakeEngine {
        async fn published_ports(&self, _project: &str) -> Result<Vec<String>> {
            if self.unreachable {
                return Err(ContainerError::DockerConnectionFailed(
                    "Connection refused".to_string(),
                ));
            }
            Ok(self.own_ports.clone())
        }

        async fn compose_working_dirs(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeInspector {
        listeners: HashMap<String, u32>,
        processes: HashMap<u32, String>,
    }

    impl FakeInspector {
        fn listen(mut self, port: &str, pid: u32, cmd: Option<&str>) -> Self {
            self.listeners.insert(port.to_string(), pid);
            if let Some(cmd) = cmd {
                self.processes.insert(pid, cmd.to_string());
            }
            self
        }
    }

    impl PortInspector for FakeInspector {
        async fn listener_pid(&self, port: &str) -> Result<Option<u32>> {
            Ok(self.listeners.get(port).copied())
        }

        async fn process_info(&self, pid: u32) -> Result<Option<ProcessInfo>> {
            Ok(self.processes.get(&pid).map(|cmd| ProcessInfo {
                pid,
                ppid: 1,
                uid: 1000,
                gid: 1000,
                cmd: cmd.clone(),
            }))
        }
    }

    fn ports(ports: &[&str]) -> Vec<String> {
        ports.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_no_listeners() {
        let engine = FakeEngine::default();
        let inspector = FakeInspector::default();
        let checker = PortChecker::new(&engine, &inspector);

        let required = ports(&["27017", "80", "6379"]);
        checker.check("t", &required).await.unwrap();
        for port in &required {
            checker.check("t", std::slice::from_ref(port)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_external_listener_is_reported() {
        let engine = FakeEngine::default();
        let inspector = FakeInspector::default().listen("27017", 4242, Some("mongod"));
        let checker = PortChecker::new(&engine, &inspector);

        let err = checker
            .check("t", &ports(&["27017", "80"]))
            .await
            .unwrap_err();

        match &err {
            ContainerError::PortsAllocated(conflicts) => {
                assert_eq!(
                    conflicts,
                    &vec![PortConflict {
                        port: "27017".to_string(),
                        pid: 4242,
                        cmd: Some("mongod".to_string()),
                    }]
                );
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!err.to_string().contains("port 80 "));
    }

    #[tokio::test]
    async fn test_own_container_ports_are_ignored() {
        let engine = FakeEngine {
            own_ports: ports(&["27017"]),
            ..Default::default()
        };
        let inspector = FakeInspector::default().listen("27017", 4242, Some("docker-proxy"));
        let checker = PortChecker::new(&engine, &inspector);

        checker.check("t", &ports(&["27017", "80"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_engine_fails_the_check() {
        let engine = FakeEngine {
            unreachable: true,
            ..Default::default()
        };
        let inspector = FakeInspector::default().listen("80", 7, None);
        let checker = PortChecker::new(&engine, &inspector);

        let err = checker.check("t", &ports(&["80"])).await.unwrap_err();
        assert!(matches!(err, ContainerError::DockerConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_no_required_ports_skips_the_engine() {
        let engine = FakeEngine {
            unreachable: true,
            ..Default::default()
        };
        let inspector = FakeInspector::default().listen("80", 7, None);
        let checker = PortChecker::new(&engine, &inspector);

        checker.check("t", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_process_is_listed_per_port() {
        let engine = FakeEngine::default();
        let inspector = FakeInspector::default()
            .listen("80", 10, Some("nginx: master process"))
            .listen("443", 10, Some("nginx: master process"));
        let checker = PortChecker::new(&engine, &inspector);

        let err = checker
            .check("t", &ports(&["80", "443"]))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Required port(s) are already allocated:\n\
             - port 80 is used by process with pid 10 (nginx: master process)\n\
             - port 443 is used by process with pid 10 (nginx: master process)"
        );
    }
}
