//! Session identity and the cross-cell symbol table.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::convert::INIT_FUNC_NAME;
use crate::types::{ObjId, PkgId, TypeCtx};

const ID_PREFIX: &str = "sess";

/// Session identity, wire-encoded as `"sess" + hex(json({"time": ns}))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId {
    pub time: i64,
}

impl SessionId {
    pub fn new() -> SessionId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        SessionId { time: now }
    }

    pub fn marshal(&self) -> String {
        let json = serde_json::to_vec(self).expect("session id serializes");
        let mut out = String::with_capacity(ID_PREFIX.len() + json.len() * 2);
        out.push_str(ID_PREFIX);
        for b in json {
            out.push_str(&format!("{:02x}", b));
        }
        out
    }

    pub fn unmarshal(s: &str) -> Result<SessionId, String> {
        let hex = s
            .strip_prefix(ID_PREFIX)
            .ok_or_else(|| format!("expected {} prefix but got {}", ID_PREFIX, s))?;
        if hex.len() % 2 != 0 {
            return Err("odd-length hex in session id".to_string());
        }
        let mut bytes = Vec::with_capacity(hex.len() / 2);
        for i in (0..hex.len()).step_by(2) {
            let b = u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("bad hex in session id: {}", e))?;
            bytes.push(b);
        }
        serde_json::from_slice(&bytes).map_err(|e| format!("bad session id payload: {}", e))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId::new()
    }
}

/// Session-held state: the checker context plus the insertion-ordered
/// name → object tables carried from cell to cell. Names are unique within
/// each table; a newer definition shadows (replaces) the older one.
pub struct SessionState {
    pub ctx: TypeCtx,
    vars: Vec<(String, ObjId)>,
    imports: Vec<(String, ObjId)>,
}

impl SessionState {
    pub fn new() -> SessionState {
        SessionState {
            ctx: TypeCtx::new(),
            vars: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Objects visible to the next cell, in insertion order.
    pub fn olds(&self) -> Vec<ObjId> {
        self.vars.iter().map(|(_, obj)| *obj).collect()
    }

    pub fn old_imports(&self) -> Vec<ObjId> {
        self.imports.iter().map(|(_, obj)| *obj).collect()
    }

    pub fn var_names(&self) -> Vec<&str> {
        self.vars.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<ObjId> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, obj)| *obj)
    }

    /// Commit a converted cell's package-level objects. The package's own
    /// scope holds exactly this cell's definitions (session carry-overs
    /// live in the spliced values scope); only the synthesized entry
    /// function is held back.
    pub fn merge_package(&mut self, pkg: PkgId) {
        let scope = self.ctx.pkg(pkg).scope;
        for name in self.ctx.scope_names(scope) {
            if name == INIT_FUNC_NAME {
                continue;
            }
            let obj = match self.ctx.scope_lookup(scope, &name) {
                Some(obj) => obj,
                None => continue,
            };
            insert_shadowing(&mut self.vars, name, obj);
        }
    }

    pub fn merge_imports(&mut self, imports: &[ObjId]) {
        for &obj in imports {
            let name = self.ctx.obj(obj).name.clone();
            insert_shadowing(&mut self.imports, name, obj);
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::new()
    }
}

fn insert_shadowing(table: &mut Vec<(String, ObjId)>, name: String, obj: ObjId) {
    if let Some(entry) = table.iter_mut().find(|(n, _)| *n == name) {
        entry.1 = obj;
    } else {
        table.push((name, obj));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrip() {
        let id = SessionId { time: 1234567890 };
        let wire = id.marshal();
        assert!(wire.starts_with("sess"));
        assert_eq!(SessionId::unmarshal(&wire).unwrap(), id);
    }

    #[test]
    fn session_id_wire_form_is_hex_json() {
        let id = SessionId { time: 42 };
        let wire = id.marshal();
        let hex = wire.strip_prefix("sess").unwrap();
        let bytes: Vec<u8> = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\"time\":42}");
    }

    #[test]
    fn unmarshal_rejects_bad_prefix() {
        assert!(SessionId::unmarshal("nope123").is_err());
    }

    #[test]
    fn shadowing_replaces_in_place() {
        let mut state = SessionState::new();
        let pkg = state.ctx.new_package("p", "p", true);
        let int = state.ctx.basic(crate::types::BasicKind::Int);
        let a = state.ctx.new_var("x", int, Some(pkg));
        let b = state.ctx.new_var("x", int, Some(pkg));
        let scope = state.ctx.pkg(pkg).scope;
        state.ctx.scope_insert(scope, a);
        state.merge_package(pkg);
        assert_eq!(state.lookup("x"), Some(a));
        state.ctx.scope_insert(scope, b);
        state.merge_package(pkg);
        assert_eq!(state.lookup("x"), Some(b));
        assert_eq!(state.olds().len(), 1);
    }

    #[test]
    fn entry_function_not_committed() {
        let mut state = SessionState::new();
        let pkg = state.ctx.new_package("p", "p", true);
        let invalid = state.ctx.invalid_type();
        let f = state.ctx.new_object(crate::types::Object {
            name: INIT_FUNC_NAME.to_string(),
            kind: crate::types::ObjKind::Func,
            typ: invalid,
            pkg: Some(pkg),
        });
        let scope = state.ctx.pkg(pkg).scope;
        state.ctx.scope_insert(scope, f);
        state.merge_package(pkg);
        assert!(state.olds().is_empty());
    }
}
