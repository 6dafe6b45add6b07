use anyhow::Result;
use tracing::debug;

use crate::template::{leftover, substitute, Placeholder, Scope};
use crate::{Action, Command, Executor, NetAppProxy, PdiskError, StatusPolicy};

static LUN_RULES: &[(Placeholder, Scope)] = &[
    (Placeholder::Size, Scope::Whole),
    (Placeholder::Uuid, Scope::Within),
    (Placeholder::SnapUuid, Scope::Within),
];

/// Parses a LUN size given in gigabytes.
pub fn parse_size<S: AsRef<str>>(size: S) -> Result<u64> {
    let size_ref = size.as_ref();
    let gb = size_ref
        .trim()
        .parse::<u64>()
        .map_err(|_| PdiskError::InvalidSize(size_ref.to_string()))?;
    Ok(gb)
}

/// An iSCSI LUN on the filer behind `proxy`.
pub struct Lun<'a> {
    uuid: String,
    size: Option<u64>,
    proxy: &'a NetAppProxy,
    executor: &'a dyn Executor,
    policy: StatusPolicy,
    snapshot_uuid: Option<String>,
}

impl<'a> Lun<'a> {
    pub fn new<S: AsRef<str>>(uuid: S, proxy: &'a NetAppProxy, executor: &'a dyn Executor) -> Self {
        Lun {
            uuid: uuid.as_ref().to_string(),
            size: None,
            proxy,
            executor,
            policy: StatusPolicy::default(),
            snapshot_uuid: None,
        }
    }

    /// Size in gigabytes, needed by `create`.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn check(&self) -> Result<i32> {
        self.execute_action(Action::Check)
    }

    pub fn create(&self) -> Result<i32> {
        self.execute_action(Action::Create)
    }

    pub fn delete(&self) -> Result<i32> {
        self.execute_action(Action::Delete)
    }

    pub fn map(&self) -> Result<i32> {
        self.execute_action(Action::Map)
    }

    pub fn unmap(&self) -> Result<i32> {
        self.execute_action(Action::Unmap)
    }

    pub fn rebase(&mut self, snapshot_lun: &Lun) -> Result<i32> {
        self.snapshot_uuid = Some(snapshot_lun.uuid().to_string());
        self.execute_action(Action::Rebase)
    }

    /// Snapshots this LUN and clones the snapshot into `snapshot_lun`.
    pub fn snapshot(&mut self, snapshot_lun: &Lun) -> Result<i32> {
        self.snapshot_uuid = Some(snapshot_lun.uuid().to_string());
        self.execute_action(Action::Snapshot)
    }

    /// Runs every command implementing `action` and returns the status of
    /// the last one run. Under [`StatusPolicy::LastWins`] a failing command
    /// does not stop the sequence, so a later success hides it.
    fn execute_action(&self, action: Action) -> Result<i32> {
        let commands = match self.proxy.commands_for(action)? {
            Some(commands) => commands,
            None => anyhow::bail!(PdiskError::NotImplemented {
                action: action.to_string(),
                backend: self.proxy.backend_type().to_string(),
            }),
        };

        let mut status = 0;
        for spec in commands {
            let argv = self.parse(action, spec.argv)?;
            let mut command = Command::new(action, spec.sub_action, argv, spec.patterns)?;
            status = command.execute(self.executor)?;

            if self.policy.stops_at(status) {
                debug!(
                    "{} action stopped after {} failed (status={})",
                    action, spec.sub_action, status
                );
                break;
            }
        }

        Ok(status)
    }

    /// Fills in the variables of this LUN.
    fn parse(&self, action: Action, mut argv: Vec<String>) -> Result<Vec<String>> {
        let unresolved = |p: Placeholder| PdiskError::UnresolvedPlaceholder {
            action: action.to_string(),
            placeholder: p.key().to_string(),
        };

        substitute(&mut argv, LUN_RULES, |p| match p {
            Placeholder::Size => self
                .size
                .map(|gb| format!("{}g", gb))
                .ok_or_else(|| unresolved(p).into()),
            Placeholder::Uuid => Ok(self.uuid.clone()),
            Placeholder::SnapUuid => self
                .snapshot_uuid
                .clone()
                .ok_or_else(|| unresolved(p).into()),
            other => Err(unresolved(other).into()),
        })?;

        if let Some(p) = leftover(&argv) {
            anyhow::bail!(PdiskError::UnresolvedPlaceholder {
                action: action.to_string(),
                placeholder: p.to_string(),
            })
        }

        Ok(argv)
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;

    use super::*;
    use crate::executor::mock::MockExecutor;
    use crate::proxy::test::settings;
    use crate::STATUS_MISMATCH;

    const PREFIX_LEN: usize = 9;

    fn tail(argv: &[String]) -> Vec<&str> {
        argv[PREFIX_LEN..].iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn create_substitutes_size_and_uuid() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new();
        let lun = Lun::new("9f3c-11aa", &proxy, &exec).with_size(20);

        assert_eq!(lun.create()?, 0);

        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][..PREFIX_LEN].last().map(|s| s.as_str()), Some("root@filer.example.org"));
        assert_eq!(
            tail(&calls[0]),
            ["lun", "create", "-s", "20g", "-t", "linux", "/vol/iscsi/stratuslab/9f3c-11aa"]
        );
        assert_eq!(
            tail(&calls[1]),
            ["lun", "map", "-f", "/vol/iscsi/stratuslab/9f3c-11aa", "linux_servers"]
        );
        for call in &calls {
            assert_eq!(leftover(call), None);
        }
        Ok(())
    }

    #[test]
    fn single_lun_actions() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new()
            .reply(0, "/vol/iscsi/stratuslab/u1  1g (1073741824)  (r/w, online)")
            .reply(0, "")
            .reply(0, "");
        let lun = Lun::new("u1", &proxy, &exec);

        assert_eq!(lun.check()?, 0);
        assert_eq!(lun.unmap()?, 0);
        assert_eq!(lun.map()?, 0);

        let calls = exec.calls();
        assert_eq!(tail(&calls[0]), ["lun", "show", "/vol/iscsi/stratuslab/u1"]);
        assert_eq!(
            tail(&calls[1]),
            ["lun", "unmap", "/vol/iscsi/stratuslab/u1", "linux_servers"]
        );
        assert_eq!(
            tail(&calls[2]),
            ["lun", "map", "-f", "/vol/iscsi/stratuslab/u1", "linux_servers"]
        );
        Ok(())
    }

    #[test]
    fn check_offline() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new().reply(0, "abc123 offline");
        let lun = Lun::new("abc123", &proxy, &exec);
        assert_eq!(lun.check()?, STATUS_MISMATCH);
        Ok(())
    }

    #[test]
    fn delete_runs_every_step() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new()
            .reply(0, "")
            .reply(0, "")
            .reply(0, "Snapshot pdisk_clone_u2 is busy because of LUN clone");
        let lun = Lun::new("u2", &proxy, &exec);

        assert_eq!(lun.delete()?, 0);

        let calls = exec.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(tail(&calls[1]), ["lun", "destroy", "/vol/iscsi/stratuslab/u2"]);
        assert_eq!(
            tail(&calls[2]),
            ["snap", "delete", "iscsi", "pdisk_clone_u2"]
        );
        Ok(())
    }

    #[test]
    fn snapshot_substitutes_both_luns() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new().reply(0, "creating snapshot...");
        let mut source = Lun::new("src", &proxy, &exec);
        let clone = Lun::new("new", &proxy, &exec);

        assert_eq!(source.snapshot(&clone)?, 0);

        let calls = exec.calls();
        assert_eq!(tail(&calls[0]), ["snap", "create", "iscsi", "pdisk_clone_src"]);
        assert_eq!(
            tail(&calls[1]),
            [
                "lun",
                "clone",
                "create",
                "/vol/iscsi/stratuslab/new",
                "-b",
                "/vol/iscsi/stratuslab/src",
                "pdisk_clone_src"
            ]
        );
        Ok(())
    }

    #[test]
    fn last_status_wins() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new()
            .reply(0, "snap create: volume is full")
            .reply(0, "");
        let mut source = Lun::new("src", &proxy, &exec);
        let clone = Lun::new("new", &proxy, &exec);

        assert_eq!(source.snapshot(&clone)?, 0);
        assert_eq!(exec.calls().len(), 2);

        let exec = MockExecutor::new().reply(0, "").reply(0, "lun map: no such LUN");
        let lun = Lun::new("u3", &proxy, &exec).with_size(1);
        assert_eq!(lun.create()?, STATUS_MISMATCH);
        Ok(())
    }

    #[test]
    fn first_failure_stops() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new().reply(0, "snap create: volume is full");
        let mut source = Lun::new("src", &proxy, &exec).with_policy(StatusPolicy::FirstFailure);
        let clone = Lun::new("new", &proxy, &exec);

        assert_eq!(source.snapshot(&clone)?, STATUS_MISMATCH);
        assert_eq!(exec.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn remote_failure_is_fatal() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new().reply(255, "ssh: connect to host filer.example.org: Connection refused");
        let lun = Lun::new("u4", &proxy, &exec);

        let err = lun.delete().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PdiskError>(),
            Some(PdiskError::CommandFailed { .. })
        ));
        assert_eq!(exec.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn rebase_not_implemented() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new();
        let mut lun = Lun::new("base", &proxy, &exec);
        let other = Lun::new("new", &proxy, &exec);

        let err = lun.rebase(&other).unwrap_err();
        match err.downcast_ref::<PdiskError>() {
            Some(PdiskError::NotImplemented { action, backend }) => {
                assert_eq!(action, "rebase");
                assert_eq!(backend, "NetApp");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(exec.calls().is_empty());
        Ok(())
    }

    #[test]
    fn missing_lun_variables() -> Result<()> {
        let proxy = NetAppProxy::new(&settings());
        let exec = MockExecutor::new();

        let err = Lun::new("nosize", &proxy, &exec).create().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PdiskError>(),
            Some(PdiskError::UnresolvedPlaceholder { placeholder, .. }) if placeholder == "%%SIZE%%"
        ));
        assert!(exec.calls().is_empty());
        Ok(())
    }

    #[test]
    fn sizes() -> Result<()> {
        assert_eq!(parse_size("10")?, 10);
        assert_eq!(parse_size(" 5 ")?, 5);
        assert!(parse_size("10g").is_err());
        assert!(parse_size("-1").is_err());
        Ok(())
    }
}
