use anyhow::Result;

/// Variables that may appear in a command template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `user@host` of the filer.
    IscsiProxy,
    PrivKey,
    InitiatorGrp,
    LunOs,
    /// Volume snapshot backing a LUN clone, still carrying `%%UUID%%`.
    SnapParent,
    /// LUN path, still carrying `%%UUID%%`.
    Name,
    /// Path of the cloned LUN, still carrying `%%SNAP_UUID%%`.
    SnapName,
    VolumeName,
    Size,
    Uuid,
    SnapUuid,
}

impl Placeholder {
    pub fn key(&self) -> &'static str {
        match self {
            Placeholder::IscsiProxy => "%%ISCSI_PROXY%%",
            Placeholder::PrivKey => "%%PRIVKEY%%",
            Placeholder::InitiatorGrp => "%%INITIATORGRP%%",
            Placeholder::LunOs => "%%LUNOS%%",
            Placeholder::SnapParent => "%%SNAP_PARENT%%",
            Placeholder::Name => "%%NAME%%",
            Placeholder::SnapName => "%%SNAP_NAME%%",
            Placeholder::VolumeName => "%%VOLUME_NAME%%",
            Placeholder::Size => "%%SIZE%%",
            Placeholder::Uuid => "%%UUID%%",
            Placeholder::SnapUuid => "%%SNAP_UUID%%",
        }
    }
}

/// Where a placeholder may sit inside a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The token is exactly the placeholder.
    Whole,
    /// The placeholder is embedded in the token.
    Within,
}

/// Rewrites `tokens` in place.
///
/// For each token the first rule of `rules` that matches is applied and
/// the others are skipped, so a value produced by one rule is never
/// rewritten by a later one within the same pass.
pub fn substitute<F>(tokens: &mut [String], rules: &[(Placeholder, Scope)], resolve: F) -> Result<()>
where
    F: Fn(Placeholder) -> Result<String>,
{
    for token in tokens.iter_mut() {
        let rule = rules.iter().find(|(p, scope)| match scope {
            Scope::Whole => token.as_str() == p.key(),
            Scope::Within => token.contains(p.key()),
        });

        if let Some((p, scope)) = rule {
            let value = resolve(*p)?;
            *token = match scope {
                Scope::Whole => value,
                Scope::Within => token.replace(p.key(), &value),
            };
        }
    }

    Ok(())
}

/// Returns the first `%%NAME%%` style placeholder left in `tokens`.
pub fn leftover(tokens: &[String]) -> Option<&str> {
    tokens.iter().find_map(|token| {
        let start = token.find("%%")?;
        let end = token[start + 2..].find("%%")?;
        Some(&token[start..start + 2 + end + 2])
    })
}
