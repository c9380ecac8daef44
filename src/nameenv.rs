use crate::loops::OperandId;
use std::collections::HashMap;

/// Interns operand names as [OperandId]s, numbering them in order of first use.
#[derive(Debug, Default)]
pub struct NameEnv {
    ids: HashMap<String, OperandId>,
    names: Vec<String>,
}

impl NameEnv {
    pub fn new() -> Self {
        NameEnv::default()
    }

    /// Returns the id of `name`, assigning the next one if `name` is new.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` distinct names are interned.
    pub fn operand(&mut self, name: &str) -> OperandId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = OperandId(
            u32::try_from(self.names.len()).expect("more than u32::MAX operand names"),
        );
        self.ids.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        id
    }

    pub fn get_name(&self, id: OperandId) -> Option<&str> {
        self.names.get(id.0 as usize).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::NameEnv;
    use crate::loops::OperandId;

    #[test]
    fn test_names_are_interned_in_order() {
        let mut env = NameEnv::new();
        let i = env.operand("i");
        let n = env.operand("n");
        assert_eq!(i, OperandId(0));
        assert_eq!(n, OperandId(1));
        assert_eq!(env.operand("i"), i);
        assert_eq!(env.get_name(n), Some("n"));
        assert_eq!(env.get_name(OperandId(2)), None);
    }
}
