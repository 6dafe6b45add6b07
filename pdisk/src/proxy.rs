use anyhow::Result;

use crate::template::{substitute, Placeholder, Scope};
use crate::{Action, PdiskError, ProxySettings, SubAction};

static BACKEND_TYPE: &str = "NetApp";

/// Guest OS tag passed to `lun create`.
static LUN_OS: &str = "linux";

/// Prepended to every filer command.
static CMD_PREFIX: &[&str] = &[
    "ssh",
    "-x",
    "-o",
    "BatchMode=yes",
    "-o",
    "StrictHostKeyChecking=no",
    "-i",
    "%%PRIVKEY%%",
    "%%ISCSI_PROXY%%",
];

/// `None` marks an action the filer cannot perform.
///
/// `delete` also drops the volume snapshot the LUN may have been cloned
/// from; this is a no-op while other clones still use it.
static ACTION_MAP: &[(Action, Option<&[SubAction]>)] = &[
    (Action::Check, Some(&[SubAction::Check])),
    (Action::Create, Some(&[SubAction::Create, SubAction::Map])),
    (
        Action::Delete,
        Some(&[SubAction::Unmap, SubAction::Delete, SubAction::Snapdel]),
    ),
    (Action::Map, Some(&[SubAction::Map])),
    (Action::Rebase, None),
    (Action::Snapshot, Some(&[SubAction::Snapshot, SubAction::Clone])),
    (Action::Unmap, Some(&[SubAction::Unmap])),
];

static NETAPP_CMDS: &[(SubAction, &[&str])] = &[
    (SubAction::Check, &["lun", "show", "%%NAME%%"]),
    (
        SubAction::Clone,
        &[
            "lun",
            "clone",
            "create",
            "%%SNAP_NAME%%",
            "-b",
            "%%NAME%%",
            "%%SNAP_PARENT%%",
        ],
    ),
    (
        SubAction::Create,
        &["lun", "create", "-s", "%%SIZE%%", "-t", "%%LUNOS%%", "%%NAME%%"],
    ),
    (SubAction::Delete, &["lun", "destroy", "%%NAME%%"]),
    (
        SubAction::Map,
        &["lun", "map", "-f", "%%NAME%%", "%%INITIATORGRP%%"],
    ),
    (
        SubAction::Snapdel,
        &["snap", "delete", "%%VOLUME_NAME%%", "%%SNAP_PARENT%%"],
    ),
    (
        SubAction::Snapshot,
        &["snap", "create", "%%VOLUME_NAME%%", "%%SNAP_PARENT%%"],
    ),
    (
        SubAction::Unmap,
        &["lun", "unmap", "%%NAME%%", "%%INITIATORGRP%%"],
    ),
];

/// Filer commands print nothing on success, except these.
///
/// A busy or missing snapshot is the normal outcome of `snapdel` when
/// clones remain or the LUN was never cloned.
static SUCCESS_PATTERNS: &[(SubAction, &[&str])] = &[
    (SubAction::Check, &["online"]),
    (
        SubAction::Snapdel,
        &[
            r"deleting snapshot\.\.\.",
            r"Snapshot \w+ is busy because of LUN clone",
            r"No such snapshot",
        ],
    ),
    (
        SubAction::Snapshot,
        &[r"^creating snapshot", r"^Snapshot already exists."],
    ),
];

static PROXY_RULES: &[(Placeholder, Scope)] = &[
    (Placeholder::InitiatorGrp, Scope::Whole),
    (Placeholder::LunOs, Scope::Whole),
    (Placeholder::PrivKey, Scope::Whole),
    (Placeholder::IscsiProxy, Scope::Whole),
    (Placeholder::SnapParent, Scope::Whole),
    (Placeholder::Name, Scope::Whole),
    (Placeholder::SnapName, Scope::Whole),
    (Placeholder::VolumeName, Scope::Whole),
];

/// `None` when the backend does not implement `action`.
pub fn sub_actions(action: Action) -> Result<Option<&'static [SubAction]>> {
    lookup(ACTION_MAP, action)
}

fn lookup(
    map: &[(Action, Option<&'static [SubAction]>)],
    action: Action,
) -> Result<Option<&'static [SubAction]>> {
    let (_, subs) = map
        .iter()
        .find(|(a, _)| *a == action)
        .ok_or_else(|| PdiskError::UnknownAction(action.to_string()))?;
    Ok(subs.filter(|subs| !subs.is_empty()))
}

pub fn command_template(sub_action: SubAction) -> Result<&'static [&'static str]> {
    let (_, cmd) = NETAPP_CMDS
        .iter()
        .find(|(s, _)| *s == sub_action)
        .ok_or_else(|| PdiskError::UnknownSubAction(sub_action.to_string()))?;
    Ok(*cmd)
}

pub fn success_patterns(sub_action: SubAction) -> Option<&'static [&'static str]> {
    SUCCESS_PATTERNS
        .iter()
        .find(|(s, _)| *s == sub_action)
        .map(|(_, patterns)| *patterns)
}

/// One filer command with the proxy variables filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub sub_action: SubAction,
    /// Still carries the LUN placeholders.
    pub argv: Vec<String>,
    /// `None`: the command succeeds only when it prints nothing.
    pub patterns: Option<&'static [&'static str]>,
}

/// A NetApp filer reachable over ssh.
///
/// Knows nothing about individual LUNs: LUN variables are left in the
/// commands it builds.
#[derive(Debug, Clone)]
pub struct NetAppProxy {
    host: String,
    mgt_user: String,
    mgt_priv_key: String,
    volume_name: String,
    namespace: String,
    initiator_group: String,
    snapshot_prefix: String,
}

impl NetAppProxy {
    pub fn new(settings: &ProxySettings) -> Self {
        let volume_name = settings
            .volume
            .rsplit('/')
            .next()
            .unwrap_or(&settings.volume)
            .to_string();

        NetAppProxy {
            host: settings.host.clone(),
            mgt_user: settings.mgt_user.clone(),
            mgt_priv_key: settings.mgt_priv_key.clone(),
            volume_name,
            namespace: format!("{}/{}", settings.volume, settings.lun_namespace),
            initiator_group: settings.initiator_group.clone(),
            snapshot_prefix: settings.snapshot_prefix.clone(),
        }
    }

    pub fn backend_type(&self) -> &str {
        BACKEND_TYPE
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path under which LUNs are created, `<volume>/<lun namespace>`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    /// The commands implementing `action`, in execution order, or `None`
    /// when this backend does not implement it.
    pub fn commands_for(&self, action: Action) -> Result<Option<Vec<CommandSpec>>> {
        let subs = match sub_actions(action)? {
            Some(subs) if !subs.is_empty() => subs,
            _ => return Ok(None),
        };

        let mut commands = Vec::with_capacity(subs.len());
        for sub_action in subs {
            let template = command_template(*sub_action)?;
            commands.push(CommandSpec {
                sub_action: *sub_action,
                argv: self.parse(template)?,
                patterns: success_patterns(*sub_action),
            });
        }

        Ok(Some(commands))
    }

    fn parse(&self, template: &[&str]) -> Result<Vec<String>> {
        let mut argv = CMD_PREFIX
            .iter()
            .chain(template.iter())
            .map(|t| t.to_string())
            .collect::<Vec<String>>();

        substitute(&mut argv, PROXY_RULES, |p| self.resolve(p))?;

        Ok(argv)
    }

    fn resolve(&self, placeholder: Placeholder) -> Result<String> {
        let value = match placeholder {
            Placeholder::InitiatorGrp => self.initiator_group.clone(),
            Placeholder::LunOs => LUN_OS.to_string(),
            Placeholder::PrivKey => self.mgt_priv_key.clone(),
            Placeholder::IscsiProxy => format!("{}@{}", self.mgt_user, self.host),
            Placeholder::SnapParent => format!("{}_{}", self.snapshot_prefix, Placeholder::Uuid.key()),
            Placeholder::Name => format!("{}/{}", self.namespace, Placeholder::Uuid.key()),
            Placeholder::SnapName => format!("{}/{}", self.namespace, Placeholder::SnapUuid.key()),
            Placeholder::VolumeName => self.volume_name.clone(),
            other => anyhow::bail!(PdiskError::UnresolvedPlaceholder {
                action: "proxy".to_string(),
                placeholder: other.key().to_string(),
            }),
        };

        Ok(value)
    }
}
