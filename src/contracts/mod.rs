//! Application contracts tracked by the gateway.
//!
//! A [`Contract`] record is persisted only after its deployment committed on
//! chain. The record also carries a mirror of the contract's permission
//! graph (which roles may call which methods, which identities hold which
//! roles). The chain enforces permissions; the mirror is only ever updated
//! after the matching authorization transaction succeeded.
//!
//! ## Layout
//!
//! - [`notify`]: decoding of execution notifications into typed results
//! - [`store`]: persistence keyed by name with an address index
//! - [`engine`]: deploy, invoke, migrate, destroy and role management
//! - [`game`]: typed calls for the grid game contract

pub mod engine;
pub mod game;
pub mod notify;
pub mod store;

pub use engine::{ContractEngine, Invocation, MigrateRequest, ReconcileReport};
pub use game::{ContractInfo, GameContract, GridPoints, Point};
pub use store::ContractStore;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::IdentityAuth;
use crate::error::{ServiceError, ServiceResult};
use crate::transaction::DeployCode;
use crate::types::Address;

/// Methods and the roles allowed to call them
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRoles {
    /// Method name
    pub name: String,
    /// Roles assigned to the method
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A role and the identities holding it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMembers {
    /// Role name
    pub role: String,
    /// Member identities
    #[serde(default)]
    pub ontids: Vec<String>,
}

/// Deployment metadata supplied by the caller
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMeta {
    /// Unique application-level name
    pub name: String,
    /// Hex-encoded script
    pub script: String,
    /// Version string
    pub version: String,
    /// Whether the contract uses storage
    #[serde(default)]
    pub storage: bool,
    /// Author
    #[serde(default)]
    pub author: String,
    /// Contact email
    #[serde(default)]
    pub email: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
}

/// A contract tracked by the gateway
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    /// Unique application-level name
    pub name: String,
    /// Hex-encoded script
    pub script: String,
    /// Version string
    pub version: String,
    /// Whether the contract uses storage
    pub storage: bool,
    /// Author
    pub author: String,
    /// Contact email
    pub email: String,
    /// Free-form description
    pub description: String,
    /// Address derived from the script
    pub contract_address: Address,
    /// ABI document, if one was supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<Value>,
    /// Callable methods and their roles
    #[serde(default)]
    pub methods: Vec<MethodRoles>,
    /// Roles and their members
    #[serde(default)]
    pub roles: Vec<RoleMembers>,
    /// Admin identity, set once authorization is initialized
    #[serde(rename = "adminOntID", default, skip_serializing_if = "Option::is_none")]
    pub admin_ontid: Option<IdentityAuth>,
    /// Cached on-chain info of the game variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_info: Option<Value>,
}

fn script_address(script: &str) -> ServiceResult<Address> {
    if script.is_empty() {
        return Err(ServiceError::bad_request("empty script"));
    }
    Ok(Address::from_vm_code_hex(script)?)
}

impl Contract {
    /// Record for `meta`, not yet deployed. Methods are taken from `abi`
    /// when it lists functions; the entrypoint is skipped.
    pub fn new(meta: ContractMeta, abi: Option<Value>) -> ServiceResult<Self> {
        if meta.name.is_empty() || meta.version.is_empty() {
            return Err(ServiceError::bad_request("name and version are required"));
        }
        let contract_address = script_address(&meta.script)?;
        let mut contract = Self {
            name: meta.name,
            script: meta.script,
            version: meta.version,
            storage: meta.storage,
            author: meta.author,
            email: meta.email,
            description: meta.description,
            contract_address,
            abi: None,
            methods: Vec::new(),
            roles: Vec::new(),
            admin_ontid: None,
            contract_info: None,
        };
        if let Some(abi) = abi {
            for method in abi_methods(&abi) {
                contract.add_method(&method);
            }
            contract.abi = Some(abi);
        }
        Ok(contract)
    }

    /// Deployment payload for the current script and metadata
    pub fn deploy_code(&self) -> ServiceResult<DeployCode> {
        let code = hex::decode(&self.script)
            .map_err(|_| ServiceError::bad_request("script is not valid hex"))?;
        Ok(DeployCode {
            code,
            need_storage: self.storage,
            name: self.name.clone(),
            version: self.version.clone(),
            author: self.author.clone(),
            email: self.email.clone(),
            description: self.description.clone(),
        })
    }

    /// Swap in a migrated script, recomputing the address
    pub fn set_script(&mut self, script: &str) -> ServiceResult<()> {
        self.contract_address = script_address(script)?;
        self.script = script.to_string();
        Ok(())
    }

    /// Track `name` as a callable method; `false` if already tracked
    pub fn add_method(&mut self, name: &str) -> bool {
        if self.methods.iter().any(|m| m.name == name) {
            return false;
        }
        self.methods.push(MethodRoles {
            name: name.to_string(),
            roles: Vec::new(),
        });
        true
    }

    /// Whether `role` exists
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.role == role)
    }

    fn role_mut(&mut self, role: &str) -> Option<&mut RoleMembers> {
        self.roles.iter_mut().find(|r| r.role == role)
    }

    fn method_mut(&mut self, name: &str) -> Option<&mut MethodRoles> {
        self.methods.iter_mut().find(|m| m.name == name)
    }

    /// Create `role`
    pub fn add_role(&mut self, role: &str) -> ServiceResult<()> {
        if role.is_empty() {
            return Err(ServiceError::bad_request("empty role name"));
        }
        if self.has_role(role) {
            return Err(ServiceError::Duplicated);
        }
        self.roles.push(RoleMembers {
            role: role.to_string(),
            ontids: Vec::new(),
        });
        Ok(())
    }

    /// Grant an existing `role` to `ontid`
    pub fn add_ontid_to_role(&mut self, role: &str, ontid: &str) -> ServiceResult<()> {
        let members = self
            .role_mut(role)
            .ok_or_else(|| ServiceError::bad_request(format!("role {role} does not exist")))?;
        if members.ontids.iter().any(|id| id == ontid) {
            return Err(ServiceError::Duplicated);
        }
        members.ontids.push(ontid.to_string());
        Ok(())
    }

    /// Allow an existing `role` to call `method`. Unknown methods are
    /// tracked on the fly.
    pub fn assign_method_to_role(&mut self, method: &str, role: &str) -> ServiceResult<()> {
        if !self.has_role(role) {
            return Err(ServiceError::bad_request(format!("role {role} does not exist")));
        }
        self.add_method(method);
        let entry = self
            .method_mut(method)
            .ok_or_else(|| ServiceError::internal("method vanished"))?;
        if entry.roles.iter().any(|r| r == role) {
            return Err(ServiceError::Duplicated);
        }
        entry.roles.push(role.to_string());
        Ok(())
    }

    /// Merge `role` with `ontids` into the graph, ignoring what is already
    /// present. Used to re-apply a confirmed change to a fresh copy.
    pub fn merge_members(&mut self, role: &str, ontids: &[String]) {
        if !self.has_role(role) {
            self.roles.push(RoleMembers {
                role: role.to_string(),
                ontids: Vec::new(),
            });
        }
        if let Some(members) = self.role_mut(role) {
            for ontid in ontids {
                if !members.ontids.contains(ontid) {
                    members.ontids.push(ontid.clone());
                }
            }
        }
    }

    /// Merge `role` into the roles of `methods`, ignoring what is already
    /// present
    pub fn merge_methods(&mut self, role: &str, methods: &[String]) {
        self.merge_members(role, &[]);
        for method in methods {
            self.add_method(method);
            if let Some(entry) = self.method_mut(method) {
                if !entry.roles.iter().any(|r| r == role) {
                    entry.roles.push(role.to_string());
                }
            }
        }
    }
}

/// Function names of an ABI document, entrypoint excluded. Accepts both a
/// bare ABI and one nested under an `abi` key.
#[must_use]
pub fn abi_methods(abi: &Value) -> Vec<String> {
    let abi = abi.get("abi").unwrap_or(abi);
    let entrypoint = abi.get("entrypoint").and_then(Value::as_str).unwrap_or_default();
    abi.get("functions")
        .and_then(Value::as_array)
        .map(|functions| {
            functions
                .iter()
                .filter_map(|f| f.get("name").and_then(Value::as_str))
                .filter(|name| *name != entrypoint)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn meta() -> ContractMeta {
        ContractMeta {
            name: "demo".into(),
            script: "00c56b".into(),
            version: "1".into(),
            storage: true,
            author: "a".into(),
            email: "e".into(),
            description: "d".into(),
        }
    }

    #[test]
    fn test_new_derives_address_and_methods() {
        let abi = json!({
            "entrypoint": "Main",
            "functions": [{"name": "Main"}, {"name": "Set"}, {"name": "Get"}]
        });
        let contract = Contract::new(meta(), Some(abi)).unwrap();
        assert_eq!(
            contract.contract_address,
            Address::from_vm_code(&[0x00, 0xc5, 0x6b])
        );
        let names: Vec<_> = contract.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Set", "Get"]);
    }

    #[test]
    fn test_new_rejects_bad_input() {
        let mut bad = meta();
        bad.script = "zz".into();
        assert!(matches!(Contract::new(bad, None), Err(ServiceError::BadRequest(_))));
        let mut bad = meta();
        bad.name.clear();
        assert!(matches!(Contract::new(bad, None), Err(ServiceError::BadRequest(_))));
    }

    #[test]
    fn test_nested_abi_accepted() {
        let abi = json!({"abi": {"entrypoint": "Main", "functions": [{"name": "Put"}]}});
        assert_eq!(abi_methods(&abi), vec!["Put".to_string()]);
        assert!(abi_methods(&json!({})).is_empty());
    }

    #[test]
    fn test_role_graph_rules() {
        let mut c = Contract::new(meta(), None).unwrap();
        assert!(matches!(
            c.add_ontid_to_role("op", "did:ont:A"),
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            c.assign_method_to_role("Set", "op"),
            Err(ServiceError::BadRequest(_))
        ));

        c.add_role("op").unwrap();
        assert_eq!(c.add_role("op"), Err(ServiceError::Duplicated));

        c.add_ontid_to_role("op", "did:ont:A").unwrap();
        assert_eq!(c.add_ontid_to_role("op", "did:ont:A"), Err(ServiceError::Duplicated));

        c.assign_method_to_role("Set", "op").unwrap();
        assert_eq!(c.assign_method_to_role("Set", "op"), Err(ServiceError::Duplicated));
        assert_eq!(c.methods[0].roles, vec!["op".to_string()]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut c = Contract::new(meta(), None).unwrap();
        let ids = vec!["did:ont:A".to_string(), "did:ont:B".to_string()];
        c.merge_members("op", &ids);
        c.merge_members("op", &ids);
        assert_eq!(c.roles.len(), 1);
        assert_eq!(c.roles[0].ontids, ids);

        let methods = vec!["Set".to_string()];
        c.merge_methods("op", &methods);
        c.merge_methods("op", &methods);
        assert_eq!(c.methods.len(), 1);
        assert_eq!(c.methods[0].roles, vec!["op".to_string()]);
    }

    #[test]
    fn test_record_layout() {
        let mut c = Contract::new(meta(), None).unwrap();
        c.admin_ontid = Some(IdentityAuth::new("did:ont:A", 1));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["contractAddress"], c.contract_address.to_base58());
        assert_eq!(json["adminOntID"]["ontid"], "did:ont:A");
        assert_eq!(json["adminOntID"]["keyNo"], 1);
        assert!(json.get("contractInfo").is_none());
        let back: Contract = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_set_script_recomputes_address() {
        let mut c = Contract::new(meta(), None).unwrap();
        let before = c.contract_address;
        c.set_script("00c56b6c").unwrap();
        assert_ne!(c.contract_address, before);
        assert_eq!(c.script, "00c56b6c");
    }
}
