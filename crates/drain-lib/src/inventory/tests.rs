//! Discovery tests
//!
//! These tests run discovery against an in-memory runtime and a temporary
//! services directory, without requiring docker.

#[cfg(test)]
mod fake_runtime_tests {
    use crate::error::{DrainError, Result};
    use crate::inventory::{
        async_trait, ContainerRuntime, InventoryReader, NoRouting, RoutingConfig,
        SmartstackRoutes,
    };
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// In-memory runtime holding container environments
    #[derive(Default)]
    struct FakeRuntime {
        containers: Vec<(String, BTreeMap<String, String>)>,
        fail_listing: bool,
        killed: Mutex<Vec<String>>,
    }

    impl FakeRuntime {
        fn with(mut self, id: &str, env: &[(&str, &str)]) -> Self {
            let env = env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.containers.push((id.to_string(), env));
            self
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn list_running(&self) -> Result<Vec<String>> {
            if self.fail_listing {
                return Err(DrainError::Discovery("docker ps failed".into()));
            }
            Ok(self.containers.iter().map(|(id, _)| id.clone()).collect())
        }

        async fn inspect_env(&self, container_id: &str) -> Result<BTreeMap<String, String>> {
            self.containers
                .iter()
                .find(|(id, _)| id == container_id)
                .map(|(_, env)| env.clone())
                .ok_or_else(|| DrainError::Discovery(format!("no such container {}", container_id)))
        }

        async fn kill(&self, container_id: &str) -> Result<()> {
            self.killed.lock().unwrap().push(container_id.to_string());
            Ok(())
        }
    }

    struct StaticRouting(HashMap<(String, String), u16>);

    impl RoutingConfig for StaticRouting {
        fn proxy_port(&self, service: &str, instance: &str) -> Option<u16> {
            self.0
                .get(&(service.to_string(), instance.to_string()))
                .copied()
        }
    }

    fn paasta_env<'a>(
        service: &'a str,
        instance: &'a str,
        port: &'a str,
    ) -> Vec<(&'a str, &'a str)> {
        vec![
            ("PAASTA_SERVICE", service),
            ("PAASTA_INSTANCE", instance),
            ("MARATHON_PORT", port),
        ]
    }

    #[tokio::test]
    async fn test_discovery_skips_unmanaged_containers() {
        let runtime = FakeRuntime::default()
            .with("aaaaaaaaaaa1", &paasta_env("api", "main", "31000"))
            .with("bbbbbbbbbbb1", &[("PAASTA_SERVICE", "web"), ("PAASTA_INSTANCE", "main")])
            .with("ccccccccccc1", &[("PATH", "/usr/bin")])
            .with("ddddddddddd1", &paasta_env("web", "main", "31001"));

        let reader = InventoryReader::new(Arc::new(runtime), Arc::new(NoRouting));
        let inventory = reader.discover().await.unwrap();

        let managed: Vec<_> = inventory.containers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(managed, vec!["aaaaaaaaaaa1", "ddddddddddd1"]);

        let skipped: Vec<_> = inventory.skipped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(skipped, vec!["bbbbbbbbbbb1", "ccccccccccc1"]);
        assert_eq!(inventory.skipped[0].reason, "missing MARATHON_PORT");
    }

    #[tokio::test]
    async fn test_discovery_invalid_port_is_unmanaged() {
        let runtime =
            FakeRuntime::default().with("aaaaaaaaaaa1", &paasta_env("api", "main", "not-a-port"));

        let reader = InventoryReader::new(Arc::new(runtime), Arc::new(NoRouting));
        let inventory = reader.discover().await.unwrap();

        assert!(inventory.containers.is_empty());
        assert!(inventory.skipped[0].reason.starts_with("invalid MARATHON_PORT"));
    }

    #[tokio::test]
    async fn test_empty_inventory_is_fatal() {
        let reader = InventoryReader::new(Arc::new(FakeRuntime::default()), Arc::new(NoRouting));
        let err = reader.discover().await.unwrap_err();
        assert!(matches!(err, DrainError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let runtime = FakeRuntime {
            fail_listing: true,
            ..FakeRuntime::default()
        }
        .with("aaaaaaaaaaa1", &paasta_env("api", "main", "31000"));

        let reader = InventoryReader::new(Arc::new(runtime), Arc::new(NoRouting));
        assert!(matches!(
            reader.discover().await,
            Err(DrainError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_discovery_resolves_proxy_port() {
        let runtime = FakeRuntime::default()
            .with("aaaaaaaaaaa1", &paasta_env("api", "main", "31000"))
            .with("bbbbbbbbbbb1", &paasta_env("batch", "worker", "31001"));

        let mut ports = HashMap::new();
        ports.insert(("api".to_string(), "main".to_string()), 20001);

        let reader = InventoryReader::new(Arc::new(runtime), Arc::new(StaticRouting(ports)));
        let inventory = reader.discover().await.unwrap();

        assert_eq!(inventory.containers[0].proxy_port, Some(20001));
        assert_eq!(inventory.containers[0].host_port, 31000);
        assert_eq!(inventory.containers[1].proxy_port, None);
    }

    #[tokio::test]
    async fn test_fake_runtime_kill_records() {
        let runtime = FakeRuntime::default();
        runtime.kill("aaaaaaaaaaa1").await.unwrap();
        assert_eq!(*runtime.killed.lock().unwrap(), vec!["aaaaaaaaaaa1"]);
    }

    #[test]
    fn test_smartstack_routes_reads_proxy_port() {
        let temp_dir = TempDir::new().unwrap();
        let service_dir = temp_dir.path().join("api");
        std::fs::create_dir_all(&service_dir).unwrap();
        std::fs::write(
            service_dir.join("smartstack.yaml"),
            r#"
main:
  proxy_port: 20001
  timeout_server_ms: 1000
canary:
  advertise: [region]
"#,
        )
        .unwrap();

        let routes = SmartstackRoutes::new(temp_dir.path());
        assert_eq!(routes.proxy_port("api", "main"), Some(20001));
        assert_eq!(routes.proxy_port("api", "canary"), None);
        assert_eq!(routes.proxy_port("api", "missing"), None);
        assert_eq!(routes.proxy_port("web", "main"), None);
    }

    #[test]
    fn test_smartstack_routes_malformed_file_is_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let service_dir = temp_dir.path().join("api");
        std::fs::create_dir_all(&service_dir).unwrap();
        std::fs::write(service_dir.join("smartstack.yaml"), "main: [unbalanced").unwrap();

        let routes = SmartstackRoutes::new(temp_dir.path());
        assert_eq!(routes.proxy_port("api", "main"), None);
    }
}
