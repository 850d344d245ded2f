use crate::models::DeviceType;

/// Static CLI conventions for one device platform
#[derive(Debug)]
pub struct VendorProfile {
    pub device_type: DeviceType,
    enter: &'static [&'static str],
    commit: &'static [&'static str],
    exit: &'static [&'static str],
    save: &'static [&'static str],
    /// Regex matched against the tail of session output to detect a ready prompt
    prompt: &'static str,
}

static CISCO_XE: VendorProfile = VendorProfile {
    device_type: DeviceType::CiscoXe,
    enter: &["terminal length 0", "configure terminal"],
    commit: &[],
    exit: &["end"],
    save: &["write memory"],
    prompt: r"[\w.\-()/:]+[#>]\s*$",
};

static CISCO_XR: VendorProfile = VendorProfile {
    device_type: DeviceType::CiscoXr,
    enter: &["terminal length 0", "configure terminal"],
    commit: &["commit"],
    exit: &["end"],
    save: &[],
    prompt: r"[\w.\-()/:]+[#>]\s*$",
};

static JUNIPER_JUNOS: VendorProfile = VendorProfile {
    device_type: DeviceType::JuniperJunos,
    enter: &["set cli screen-length 0", "configure private"],
    commit: &["commit and-quit"],
    exit: &[],
    save: &[],
    prompt: r"[\w.\-@]+[>#%]\s*$",
};

// `save` stops at a "[Y/N]:" confirmation before the system prompt returns
const HUAWEI_PROMPT: &str = r"(?:[<\[][\w.\-~/:]+[>\]]|\[[Yy]/[Nn]\]:?)\s*$";

static HUAWEI_VRP: VendorProfile = VendorProfile {
    device_type: DeviceType::HuaweiVrp,
    enter: &["screen-length 0 temporary", "system-view immediately"],
    commit: &[],
    exit: &["return"],
    save: &["save", "y"],
    prompt: HUAWEI_PROMPT,
};

static HUAWEI_VRP_XPL: VendorProfile = VendorProfile {
    device_type: DeviceType::HuaweiVrpXpl,
    enter: &["screen-length 0 temporary", "system-view"],
    commit: &["commit"],
    exit: &["return"],
    save: &["save", "y"],
    prompt: HUAWEI_PROMPT,
};

impl DeviceType {
    /// Look up the vendor profile for this platform
    pub fn profile(&self) -> &'static VendorProfile {
        match self {
            DeviceType::CiscoXe => &CISCO_XE,
            DeviceType::CiscoXr => &CISCO_XR,
            DeviceType::JuniperJunos => &JUNIPER_JUNOS,
            DeviceType::HuaweiVrp => &HUAWEI_VRP,
            DeviceType::HuaweiVrpXpl => &HUAWEI_VRP_XPL,
        }
    }
}

impl VendorProfile {
    /// Full sequence for an activate or deactivate body: enter, body, commit, exit, save
    pub fn config_commands(&self, body: &str) -> Vec<String> {
        self.wrap(body, true)
    }

    /// Sequence for a remove body. Saving is left to the activate push that follows.
    pub fn remove_commands(&self, body: &str) -> Vec<String> {
        self.wrap(body, false)
    }

    pub fn prompt_pattern(&self) -> &'static str {
        self.prompt
    }

    fn wrap(&self, body: &str, save: bool) -> Vec<String> {
        let mut commands: Vec<String> = self.enter.iter().map(|s| s.to_string()).collect();
        commands.extend(body_lines(body));
        commands.extend(self.commit.iter().map(|s| s.to_string()));
        commands.extend(self.exit.iter().map(|s| s.to_string()));
        if save {
            commands.extend(self.save.iter().map(|s| s.to_string()));
        }
        commands
    }
}

/// Rendered template text as a list of commands: blank lines and `!` comments dropped
fn body_lines(body: &str) -> impl Iterator<Item = String> + '_ {
    body.lines()
        .map(|l| l.trim_end())
        .filter(|l| {
            let t = l.trim_start();
            !t.is_empty() && !t.starts_with('!')
        })
        .map(|l| l.to_string())
}
