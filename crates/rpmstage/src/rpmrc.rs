use crate::error::Result;
use crate::package::RpmrcConfig;
use crate::util;
use crate::workspace::RpmLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    pub rpmrc: String,
    pub rpmmacros: String,
}

/// The configured macro files gain `<specdir>/rpmmacros`; the configured macros
/// gain `%_topdir` and `%_rpmdir` bindings to the working tree.
pub fn render(cfg: &RpmrcConfig, layout: &RpmLayout) -> ResourceConfig {
    let mut macrofiles = cfg.macrofiles.clone();
    macrofiles.push(layout.rpmmacros_path().display().to_string());

    let mut macros = cfg.macros.clone();
    macros.push(format!("%_topdir {}", layout.topdir.display()));
    macros.push(format!("%_rpmdir {}", layout.rpmdir.display()));

    let mut rpmmacros = String::new();
    for m in &macros {
        tracing::debug!("macro: {m}");
        rpmmacros.push_str(m);
        rpmmacros.push('\n');
    }

    ResourceConfig {
        rpmrc: format!("macrofiles: {}\n", macrofiles.join(":")),
        rpmmacros,
    }
}

pub fn write(cfg: &RpmrcConfig, layout: &RpmLayout) -> Result<ResourceConfig> {
    let rendered = render(cfg, layout);
    tracing::debug!("writing {}", layout.rpmrc_path().display());
    util::write_text(&layout.rpmrc_path(), &rendered.rpmrc)?;
    tracing::debug!("writing {}", layout.rpmmacros_path().display());
    util::write_text(&layout.rpmmacros_path(), &rendered.rpmmacros)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn appends_self_reference_and_path_bindings() {
        let layout = RpmLayout::new(Path::new("/work/pkg"));
        let cfg = RpmrcConfig {
            macrofiles: vec!["/usr/lib/rpm/macros".into()],
            macros: vec!["%_binary_payload w9.gzdio".into()],
        };
        let out = render(&cfg, &layout);
        assert_eq!(
            out.rpmrc,
            "macrofiles: /usr/lib/rpm/macros:/work/pkg/rpm/SPECS/rpmmacros\n"
        );
        assert_eq!(
            out.rpmmacros,
            "%_binary_payload w9.gzdio\n%_topdir /work/pkg/rpm\n%_rpmdir /work/pkg/rpm/RPMS\n"
        );
    }

    #[test]
    fn rendering_does_not_accumulate() {
        let layout = RpmLayout::new(Path::new("/w"));
        let cfg = RpmrcConfig::default();
        assert_eq!(render(&cfg, &layout), render(&cfg, &layout));
        assert_eq!(render(&cfg, &layout).rpmmacros.lines().count(), 2);
    }
}
