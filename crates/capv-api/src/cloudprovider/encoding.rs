use std::fmt::Display;

use snafu::{ResultExt, Snafu, ensure};
use strum::IntoEnumIterator;

use super::{
    CpiConfig, CpiGlobalConfig, CpiVCenterConfig, CpiWorkspaceConfig,
    parser::{self, ParseError},
};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum MarshalError {
    #[snafu(display(
        "variable {variable:?} in section {section:?} contains a line break, which cannot be encoded"
    ))]
    UnencodableValue { section: String, variable: String },

    #[snafu(display("vCenter name {name:?} contains a line break, which cannot be encoded"))]
    UnencodableVCenterName { name: String },
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum UnmarshalError {
    #[snafu(display("cloud provider configuration is not valid UTF-8"))]
    InvalidUtf8 { source: std::str::Utf8Error },

    #[snafu(display("failed to parse cloud provider configuration"))]
    Parse { source: ParseError },

    #[snafu(display("invalid boolean {value:?} for variable {variable:?}"))]
    InvalidBool { variable: String, value: String },

    #[snafu(display("warning:\n{warning}\n"))]
    WarningAsFatal { warning: Warning },
}

/// Data found while unmarshalling which has no place in [`CpiConfig`], for
/// example one of the deprecated `[Global]` variables `server`, `datacenter`,
/// `datastore`, `working-dir`, `vm-name` or `vm-uuid`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    pub section: String,
    pub subsection: Option<String>,
    pub variable: Option<String>,
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "can't store data at section \"{}\"", self.section)?;
        if let Some(subsection) = &self.subsection {
            write!(f, ", subsection \"{subsection}\"")?;
        }
        if let Some(variable) = &self.variable {
            write!(f, ", variable \"{variable}\"")?;
        }
        Ok(())
    }
}

/// Options which influence how INI data is unmarshalled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnmarshalOptions {
    /// Treat warnings, such as deprecated variables, as fatal errors instead
    /// of logging and skipping them.
    pub warn_as_fatal: bool,
}

impl UnmarshalOptions {
    pub fn warn_as_fatal(mut self) -> Self {
        self.warn_as_fatal = true;
        self
    }
}

/// Shorthand for `UnmarshalOptions::default().warn_as_fatal()`.
pub fn warn_as_fatal() -> UnmarshalOptions {
    UnmarshalOptions::default().warn_as_fatal()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
enum Section {
    Global,
    VirtualCenter,
    Workspace,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
enum GlobalKey {
    InsecureFlag,
    User,
    Password,
    SecretName,
    SecretNamespace,
    Port,
    CaFile,
    Datacenters,
    ClusterId,
}

/// `[Global]` variables which were removed from the cloud provider
/// configuration. They are still recognized to warn about them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
enum DeprecatedGlobalKey {
    Server,
    Datacenter,
    Datastore,
    WorkingDir,
    VmName,
    VmUuid,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
enum VCenterKey {
    User,
    Password,
    Thumbprint,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
enum WorkspaceKey {
    Server,
    Datacenter,
    Folder,
    DefaultDatastore,
}

enum Value<'a> {
    String(&'a str),
    Bool(bool),
}

enum ValueMut<'a> {
    String(&'a mut String),
    Bool(&'a mut bool),
}

/// A struct which is written to a single INI section. The variables are
/// written in the iteration order of [`IniSection::Key`].
trait IniSection {
    type Key: Copy + IntoEnumIterator + Into<&'static str> + std::str::FromStr;

    fn value(&self, key: Self::Key) -> Value<'_>;

    fn value_mut(&mut self, key: Self::Key) -> ValueMut<'_>;
}

impl IniSection for CpiGlobalConfig {
    type Key = GlobalKey;

    fn value(&self, key: GlobalKey) -> Value<'_> {
        match key {
            GlobalKey::InsecureFlag => Value::Bool(self.insecure),
            GlobalKey::User => Value::String(&self.username),
            GlobalKey::Password => Value::String(&self.password),
            GlobalKey::SecretName => Value::String(&self.secret_name),
            GlobalKey::SecretNamespace => Value::String(&self.secret_namespace),
            GlobalKey::Port => Value::String(&self.port),
            GlobalKey::CaFile => Value::String(&self.ca_file),
            GlobalKey::Datacenters => Value::String(&self.datacenters),
            GlobalKey::ClusterId => Value::String(&self.cluster_id),
        }
    }

    fn value_mut(&mut self, key: GlobalKey) -> ValueMut<'_> {
        match key {
            GlobalKey::InsecureFlag => ValueMut::Bool(&mut self.insecure),
            GlobalKey::User => ValueMut::String(&mut self.username),
            GlobalKey::Password => ValueMut::String(&mut self.password),
            GlobalKey::SecretName => ValueMut::String(&mut self.secret_name),
            GlobalKey::SecretNamespace => ValueMut::String(&mut self.secret_namespace),
            GlobalKey::Port => ValueMut::String(&mut self.port),
            GlobalKey::CaFile => ValueMut::String(&mut self.ca_file),
            GlobalKey::Datacenters => ValueMut::String(&mut self.datacenters),
            GlobalKey::ClusterId => ValueMut::String(&mut self.cluster_id),
        }
    }
}

impl IniSection for CpiVCenterConfig {
    type Key = VCenterKey;

    fn value(&self, key: VCenterKey) -> Value<'_> {
        match key {
            VCenterKey::User => Value::String(&self.username),
            VCenterKey::Password => Value::String(&self.password),
            VCenterKey::Thumbprint => Value::String(&self.thumbprint),
        }
    }

    fn value_mut(&mut self, key: VCenterKey) -> ValueMut<'_> {
        match key {
            VCenterKey::User => ValueMut::String(&mut self.username),
            VCenterKey::Password => ValueMut::String(&mut self.password),
            VCenterKey::Thumbprint => ValueMut::String(&mut self.thumbprint),
        }
    }
}

impl IniSection for CpiWorkspaceConfig {
    type Key = WorkspaceKey;

    fn value(&self, key: WorkspaceKey) -> Value<'_> {
        match key {
            WorkspaceKey::Server => Value::String(&self.server),
            WorkspaceKey::Datacenter => Value::String(&self.datacenter),
            WorkspaceKey::Folder => Value::String(&self.folder),
            WorkspaceKey::DefaultDatastore => Value::String(&self.datastore),
        }
    }

    fn value_mut(&mut self, key: WorkspaceKey) -> ValueMut<'_> {
        match key {
            WorkspaceKey::Server => ValueMut::String(&mut self.server),
            WorkspaceKey::Datacenter => ValueMut::String(&mut self.datacenter),
            WorkspaceKey::Folder => ValueMut::String(&mut self.folder),
            WorkspaceKey::DefaultDatastore => ValueMut::String(&mut self.datastore),
        }
    }
}

impl CpiConfig {
    /// Marshals the configuration into the INI format read by the vSphere
    /// cloud provider and CSI driver.
    ///
    /// Sections are written in the order `[Global]`, `[VirtualCenter "..."]`
    /// (sorted by name) and `[Workspace]`. Empty `[Global]` and `[Workspace]`
    /// sections as well as empty variables are left out, vCenter sections are
    /// always written. Every section, including the last one, is followed by a
    /// blank line. [`CpiConfig::provider_config`] is not part of the format
    /// and is ignored.
    pub fn marshal_ini(&self) -> Result<Vec<u8>, MarshalError> {
        self.marshal_ini_string().map(String::into_bytes)
    }

    /// Like [`CpiConfig::marshal_ini`], but returns the INI data as a string,
    /// which is what ConfigMaps and Secrets store.
    pub fn marshal_ini_string(&self) -> Result<String, MarshalError> {
        let mut out = String::new();

        if !self.global.is_empty() {
            write_section(&mut out, &Section::Global.to_string(), &self.global)?;
        }

        for (name, vcenter) in &self.vcenter {
            ensure!(
                !contains_line_break(name),
                UnencodableVCenterNameSnafu { name }
            );
            let header = format!("{} \"{}\"", Section::VirtualCenter, escape_subsection(name));
            write_section(&mut out, &header, vcenter)?;
        }

        if !self.workspace.is_empty() {
            write_section(&mut out, &Section::Workspace.to_string(), &self.workspace)?;
        }

        Ok(out)
    }

    /// Unmarshals INI data into `self`.
    ///
    /// Values present in `data` overwrite the current ones, vCenters are added
    /// to [`CpiConfig::vcenter`]. Data which cannot be stored, like deprecated
    /// variables, is logged and skipped unless
    /// [`UnmarshalOptions::warn_as_fatal`] is set, in which case the first
    /// occurrence is returned as [`UnmarshalError::WarningAsFatal`].
    pub fn unmarshal_ini(
        &mut self,
        data: &[u8],
        options: UnmarshalOptions,
    ) -> Result<(), UnmarshalError> {
        let input = std::str::from_utf8(data).context(InvalidUtf8Snafu)?;

        for section in parser::parse(input).context(ParseSnafu)? {
            let target = match (section.name.parse::<Section>(), section.subsection) {
                (Ok(Section::Global), None) => Target::Global,
                (Ok(Section::Workspace), None) => Target::Workspace,
                (Ok(Section::VirtualCenter), Some(vcenter)) => {
                    self.vcenter.entry(vcenter.clone()).or_default();
                    Target::VCenter(vcenter)
                }
                (_, subsection) => {
                    report(
                        Warning {
                            section: section.name.clone(),
                            subsection,
                            variable: None,
                        },
                        options,
                    )?;
                    continue;
                }
            };

            for (name, value) in &section.variables {
                let assignment = Assignment {
                    section: &section.name,
                    variable: name,
                    value,
                    options,
                };

                match &target {
                    Target::Global => {
                        if name.parse::<DeprecatedGlobalKey>().is_ok() {
                            assignment.report_deprecated()?;
                        } else {
                            assignment.apply(&mut self.global)?;
                        }
                    }
                    Target::VCenter(vcenter) => {
                        assignment.apply(self.vcenter.entry(vcenter.clone()).or_default())?;
                    }
                    Target::Workspace => assignment.apply(&mut self.workspace)?,
                }
            }
        }

        tracing::debug!(
            vcenters = self.vcenter.len(),
            "unmarshalled cloud provider configuration"
        );
        Ok(())
    }

    /// Unmarshals INI data into a new [`CpiConfig`].
    pub fn from_ini(data: &[u8], options: UnmarshalOptions) -> Result<Self, UnmarshalError> {
        let mut config = Self::default();
        config.unmarshal_ini(data, options)?;
        Ok(config)
    }
}

enum Target {
    Global,
    VCenter(String),
    Workspace,
}

struct Assignment<'a> {
    section: &'a str,
    variable: &'a str,
    value: &'a str,
    options: UnmarshalOptions,
}

impl Assignment<'_> {
    fn apply<S: IniSection>(&self, section: &mut S) -> Result<(), UnmarshalError> {
        let Ok(key) = self.variable.parse::<S::Key>() else {
            return report(self.warning(), self.options);
        };

        match section.value_mut(key) {
            ValueMut::String(field) => self.value.clone_into(field),
            ValueMut::Bool(field) => *field = self.parse_bool()?,
        }
        Ok(())
    }

    /// Variables which were dropped from the format are skipped like unknown
    /// ones, with a more specific log message.
    fn report_deprecated(&self) -> Result<(), UnmarshalError> {
        if !self.options.warn_as_fatal {
            tracing::warn!(
                section = self.section,
                variable = self.variable,
                "skipping deprecated cloud provider configuration variable"
            );
            return Ok(());
        }
        report(self.warning(), self.options)
    }

    fn warning(&self) -> Warning {
        Warning {
            section: self.section.to_owned(),
            subsection: None,
            variable: Some(self.variable.to_owned()),
        }
    }

    /// Booleans accept the same spellings as gcfg.
    fn parse_bool(&self) -> Result<bool, UnmarshalError> {
        match self.value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => InvalidBoolSnafu {
                variable: self.variable,
                value: self.value,
            }
            .fail(),
        }
    }
}

fn report(warning: Warning, options: UnmarshalOptions) -> Result<(), UnmarshalError> {
    if options.warn_as_fatal {
        return WarningAsFatalSnafu { warning }.fail();
    }

    tracing::warn!(%warning, "ignoring cloud provider configuration data");
    Ok(())
}

fn write_section<S: IniSection>(
    out: &mut String,
    header: &str,
    section: &S,
) -> Result<(), MarshalError> {
    out.push('[');
    out.push_str(header);
    out.push_str("]\n");

    for key in S::Key::iter() {
        let value = section.value(key);
        let variable: &'static str = key.into();

        match value {
            Value::Bool(true) => {
                out.push_str(variable);
                out.push_str(" = true\n");
            }
            Value::String(value) if !value.is_empty() => {
                ensure!(
                    !contains_line_break(value),
                    UnencodableValueSnafu { section: header, variable }
                );
                out.push_str(variable);
                out.push_str(" = \"");
                out.push_str(&escape_value(value));
                out.push_str("\"\n");
            }
            Value::Bool(false) | Value::String(_) => {}
        }
    }
    out.push('\n');

    Ok(())
}

fn contains_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str(r"\\"),
            '"' => escaped.push_str(r#"\""#),
            '\t' => escaped.push_str(r"\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_subsection(name: &str) -> String {
    name.replace('\\', r"\\").replace('"', r#"\""#)
}
