//! End-to-end ordering of the bootstrap against fake tools, daemons and service.

use std::collections::{HashMap, HashSet, VecDeque};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use dmboot::{BootPlan, Bootstrap, Daemon, DaemonSpec, Launcher, Seed};
use dmboot_common::{
    BootConfig, BootError, BootResult, Credentials, DotRef, RpcError, SeedAddress,
};
use dmboot_rpc::RpcTransport;
use dmboot_storage::{CommandOutput, CommandRunner};
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Default)]
struct World {
    events: Vec<String>,
    pools: HashSet<String>,
    datasets: HashSet<String>,
    mounts: HashSet<String>,
    fail_pool_create: bool,
    replies: HashMap<String, VecDeque<Result<Value, RpcError>>>,
}

/// One log shared by every fake so the global order can be asserted.
#[derive(Clone, Default)]
struct Node(Arc<Mutex<World>>);

impl Node {
    fn record(&self, event: impl Into<String>) {
        self.0.lock().events.push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().events.clone()
    }

    fn reply(&self, method: &str, reply: Result<Value, RpcError>) -> &Self {
        self.0
            .lock()
            .replies
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        self
    }
}

#[async_trait]
impl CommandRunner for Node {
    async fn run(&self, program: &str, args: &[String]) -> BootResult<CommandOutput> {
        let mut world = self.0.lock();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = match (program, args.as_slice()) {
            ("zpool", ["get", "-H", "guid", pool]) => {
                if world.pools.contains(*pool) {
                    CommandOutput::ok(format!("{pool}\tguid\t48879\t-\n"))
                } else {
                    CommandOutput::failed(1, "no such pool\n")
                }
            }
            ("zpool", ["create", "-f", pool, ..]) => {
                world.events.push(format!("zpool create {pool}"));
                if world.fail_pool_create {
                    CommandOutput::failed(1, "cannot create: no such device\n")
                } else {
                    world.pools.insert((*pool).to_string());
                    CommandOutput::ok("")
                }
            }
            ("zfs", ["list", ds]) => {
                if world.datasets.contains(*ds) {
                    CommandOutput::ok(format!("{ds}\n"))
                } else {
                    CommandOutput::failed(1, "dataset does not exist\n")
                }
            }
            ("zfs", ["create", "-o", "mountpoint=legacy", ds]) => {
                world.events.push(format!("zfs create {ds}"));
                world.datasets.insert((*ds).to_string());
                CommandOutput::ok("")
            }
            ("mountpoint", [path]) => {
                if world.mounts.contains(*path) {
                    CommandOutput::ok("is a mountpoint\n")
                } else {
                    CommandOutput::failed(32, "is not a mountpoint\n")
                }
            }
            ("mount.zfs", [ds, path]) => {
                world.events.push(format!("mount.zfs {ds}"));
                world.mounts.insert((*path).to_string());
                CommandOutput::ok("")
            }
            ("mount", ["--bind", src, dst]) => {
                let src = Path::new(src);
                let id = src.file_name().map(|n| n.to_string_lossy().into_owned());
                world
                    .events
                    .push(format!("bind {}", id.unwrap_or_default()));
                world.mounts.insert((*dst).to_string());
                CommandOutput::ok("")
            }
            other => panic!("unexpected command: {other:?}"),
        };
        Ok(out)
    }
}

#[async_trait]
impl RpcTransport for Node {
    async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        let mut world = self.0.lock();
        let short = method.trim_start_matches("DotmeshRPC.");
        world.events.push(format!("rpc {short}"));
        world
            .replies
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(RpcError::Transport {
                    message: "connection refused".to_string(),
                })
            })
    }
}

struct FakeDaemon {
    name: String,
    node: Node,
    done: bool,
}

#[async_trait]
impl Daemon for FakeDaemon {
    fn name(&self) -> &str {
        &self.name
    }

    async fn terminate(&mut self) -> BootResult<ExitStatus> {
        self.done = true;
        self.node.record(format!("stop {}", self.name));
        Ok(ExitStatus::from_raw(15))
    }

    async fn wait(&mut self) -> BootResult<ExitStatus> {
        self.done = true;
        self.node.record(format!("exit {}", self.name));
        Ok(ExitStatus::from_raw(0))
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        if !self.done {
            self.node.record(format!("release {}", self.name));
        }
    }
}

struct FakeLauncher {
    node: Node,
    specs: Arc<Mutex<Vec<DaemonSpec>>>,
}

impl Launcher for FakeLauncher {
    type Handle = FakeDaemon;

    fn launch(&self, spec: &DaemonSpec) -> BootResult<FakeDaemon> {
        self.node.record(format!("launch {}", spec.program));
        self.specs.lock().push(spec.clone());
        Ok(FakeDaemon {
            name: spec.program.clone(),
            node: self.node.clone(),
            done: false,
        })
    }
}

struct Fixture {
    node: Node,
    specs: Arc<Mutex<Vec<DaemonSpec>>>,
    config: BootConfig,
    target: PathBuf,
    _dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = BootConfig::default()
            .with_etcd_data_dir(dir.path().join("etcd"))
            .with_mount_prefix(dir.path().join("var"));
        Self {
            node: Node::default(),
            specs: Arc::default(),
            config,
            target: dir.path().join("mnt/db"),
            _dir: dir,
        }
    }

    fn plan(&self, oneshot: bool) -> BootPlan {
        BootPlan {
            pool: "pool".to_string(),
            devices: vec!["/dev/sdb".to_string()],
            dot: DotRef::new("admin", "db"),
            mountpoint: self.target.clone(),
            seed: None,
            oneshot,
            admin_password: "hunter2".to_string(),
            admin_api_key: "apikey".to_string(),
        }
    }

    async fn run(&self, plan: &BootPlan) -> BootResult<String> {
        let launcher = FakeLauncher {
            node: self.node.clone(),
            specs: Arc::clone(&self.specs),
        };
        Bootstrap::new(
            self.config.clone(),
            self.node.clone(),
            launcher,
            self.node.clone(),
        )
        .without_progress()
        .run(plan)
        .await
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn oneshot_runs_every_step_in_order() {
    let fx = Fixture::new();
    fx.node
        .reply("DotmeshRPC.Ping", Err(RpcError::NullResult))
        .reply("DotmeshRPC.Ping", Ok(json!(true)))
        .reply("DotmeshRPC.Exists", Ok(json!("")))
        .reply("DotmeshRPC.Create", Ok(json!(true)))
        .reply("DotmeshRPC.Lookup", Ok(json!("beef")));

    let id = fx.run(&fx.plan(true)).await.unwrap();

    assert_eq!(id, "beef");
    assert_eq!(
        fx.node.events(),
        vec![
            "zpool create pool",
            "zfs create pool/dotmesh-etcd",
            "mount.zfs pool/dotmesh-etcd",
            "launch etcd",
            "launch dotmesh-server",
            "rpc Ping",
            "rpc Ping",
            "rpc Exists",
            "rpc Create",
            "rpc Lookup",
            "bind beef",
            "stop dotmesh-server",
            "stop etcd",
        ]
    );
    assert!(fx.target.is_dir());
    assert!(fx.config.etcd_data_dir.is_dir());

    let specs = fx.specs.lock();
    assert_eq!(specs[1].env_var("POOL"), Some("pool"));
    assert_eq!(specs[1].env_var("INITIAL_ADMIN_API_KEY"), Some("YXBpa2V5"));
}

#[tokio::test(start_paused = true)]
async fn rerun_on_provisioned_node_creates_nothing() {
    let fx = Fixture::new();
    for _ in 0..2 {
        fx.node
            .reply("DotmeshRPC.Ping", Ok(json!(true)))
            .reply("DotmeshRPC.Exists", Ok(json!("beef")))
            .reply("DotmeshRPC.Lookup", Ok(json!("beef")));
    }

    fx.run(&fx.plan(true)).await.unwrap();
    let first = fx.node.events().len();
    fx.run(&fx.plan(true)).await.unwrap();

    let second: Vec<String> = fx.node.events().split_off(first);
    assert!(
        second
            .iter()
            .all(|e| !e.starts_with("zpool create") && !e.starts_with("zfs create")),
        "{second:?}"
    );
    assert!(!second.iter().any(|e| e == "rpc Create"));
    assert!(!second.iter().any(|e| e.starts_with("bind ")), "{second:?}");
}

#[tokio::test(start_paused = true)]
async fn seeded_dot_is_pulled_then_looked_up() {
    let fx = Fixture::new();
    fx.node
        .reply("DotmeshRPC.Ping", Ok(json!(true)))
        .reply("DotmeshRPC.Transfer", Ok(json!("t-1")))
        .reply(
            "DotmeshRPC.GetTransfer",
            Ok(json!({"Status": "finished", "Index": 1, "Total": 1})),
        )
        .reply("DotmeshRPC.Lookup", Ok(json!("cafe")));
    let mut plan = fx.plan(true);
    plan.seed = Some(Seed {
        address: SeedAddress::parse("dothub.com/alice/postgres").unwrap(),
        credentials: Credentials::parse("alice:k3y").unwrap(),
    });

    let id = fx.run(&plan).await.unwrap();

    assert_eq!(id, "cafe");
    let rpcs: Vec<String> = fx
        .node
        .events()
        .into_iter()
        .filter(|e| e.starts_with("rpc "))
        .collect();
    assert_eq!(
        rpcs,
        vec!["rpc Ping", "rpc Transfer", "rpc GetTransfer", "rpc Lookup"]
    );
}

#[tokio::test(start_paused = true)]
async fn daemon_mode_waits_on_both_daemons() {
    let fx = Fixture::new();
    fx.node
        .reply("DotmeshRPC.Ping", Ok(json!(true)))
        .reply("DotmeshRPC.Exists", Ok(json!("beef")))
        .reply("DotmeshRPC.Lookup", Ok(json!("beef")));

    fx.run(&fx.plan(false)).await.unwrap();

    let events = fx.node.events();
    assert_eq!(
        &events[events.len() - 2..],
        ["exit dotmesh-server", "exit etcd"]
    );
    assert!(!events.iter().any(|e| e.starts_with("stop ")));
}

#[tokio::test(start_paused = true)]
async fn pool_failure_launches_nothing() {
    let fx = Fixture::new();
    fx.node.0.lock().fail_pool_create = true;

    let err = fx.run(&fx.plan(true)).await.unwrap_err();

    assert!(matches!(err, BootError::Provision { .. }));
    assert_eq!(fx.node.events(), vec!["zpool create pool"]);
}

#[tokio::test(start_paused = true)]
async fn failure_after_launch_releases_service_first() {
    let fx = Fixture::new();
    fx.node
        .reply("DotmeshRPC.Ping", Ok(json!(true)))
        .reply("DotmeshRPC.Exists", Ok(json!("beef")))
        .reply("DotmeshRPC.Lookup", Ok(json!("")));

    let err = fx.run(&fx.plan(true)).await.unwrap_err();

    assert!(matches!(err, BootError::Protocol { .. }));
    let events = fx.node.events();
    assert!(!events.iter().any(|e| e.starts_with("bind ")));
    assert_eq!(
        &events[events.len() - 2..],
        ["release dotmesh-server", "release etcd"]
    );
}
