//! User accounts.

use vos_types::config::{PrivilegeLevel, UserConfig};

/// Identifies a computer within a [`World`](crate::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputerId(pub u32);

/// A user account on one computer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub privilege: PrivilegeLevel,
    pub computer: ComputerId,
    pub home: String,
}

impl User {
    pub fn from_config(config: &UserConfig, computer: ComputerId) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            privilege: config.privilege,
            computer,
            home: config.home_dir(),
        }
    }

    /// The bootstrap account: id 0 with root privilege.
    pub fn is_super_user(&self) -> bool {
        self.id == 0 && self.is_root()
    }

    pub fn is_root(&self) -> bool {
        self.privilege == PrivilegeLevel::Root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_derives_home() {
        let cfg = UserConfig::new(1000, "kim", PrivilegeLevel::Standard);
        let user = User::from_config(&cfg, ComputerId(3));
        assert_eq!(user.home, "/home/kim");
        assert_eq!(user.computer, ComputerId(3));
        assert!(!user.is_root());
    }

    #[test]
    fn super_user_needs_id_zero_and_root() {
        let root = User::from_config(&UserConfig::new(0, "root", PrivilegeLevel::Root), ComputerId(0));
        let admin =
            User::from_config(&UserConfig::new(5, "admin", PrivilegeLevel::Root), ComputerId(0));
        let fake =
            User::from_config(&UserConfig::new(0, "nobody", PrivilegeLevel::Standard), ComputerId(0));
        assert!(root.is_super_user());
        assert!(!admin.is_super_user());
        assert!(!fake.is_super_user());
    }
}
