use crate::containerfile::Node;
use crate::errors::*;
use std::collections::HashSet;

/// The build stage aliases declared with `FROM <image> AS <name>`, case-folded
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageSet {
    aliases: HashSet<String>,
}

impl StageSet {
    /// Record the alias of a FROM node, if it declares one.
    pub fn collect(&mut self, node: &Node) {
        if let Some(alias) = node.stage_alias() {
            debug!("Collected build stage alias: {alias:?}");
            self.aliases.insert(alias.to_lowercase());
        }
    }

    pub fn is_stage(&self, name: &str) -> bool {
        self.aliases.contains(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containerfile;

    #[test]
    fn test_collect_is_case_insensitive() -> Result<()> {
        let result = containerfile::parse("FROM ubuntu:20.04 AS Base\nFROM BASE\n")?;
        let mut stages = StageSet::default();
        for node in &result.ast.children {
            stages.collect(node);
        }
        assert_eq!(stages.len(), 1);
        assert!(stages.is_stage("base"));
        assert!(stages.is_stage("BASE"));
        assert!(stages.is_stage("Base"));
        assert!(!stages.is_stage("ubuntu:20.04"));
        Ok(())
    }

    #[test]
    fn test_collect_without_alias() -> Result<()> {
        let result = containerfile::parse("FROM alpine\nFROM debian as\n")?;
        let mut stages = StageSet::default();
        for node in &result.ast.children {
            stages.collect(node);
        }
        assert!(stages.is_empty());
        Ok(())
    }
}
