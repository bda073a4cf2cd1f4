use crate::containerfile::{Ast, Node};
use crate::errors::*;
use crate::reference::ImageReference;
use crate::stages::StageSet;

/// A FROM instruction that pulls an image from a registry
#[derive(Debug, Clone, PartialEq)]
pub struct FromCommand<'a> {
    pub node: &'a Node,
    pub image: ImageReference,
    pub line_start: usize,
    pub line_end: usize,
}

/// Find all FROM instructions referring to registry images, in source order.
///
/// All stage aliases are collected into `stages` before any instruction is
/// classified. Instructions that can't be understood are skipped with a warning.
pub fn extract_from_commands<'a>(ast: &'a Ast, stages: &mut StageSet) -> Vec<FromCommand<'a>> {
    let from_nodes = ast.children.iter().filter(|node| node.is_from());

    for node in from_nodes.clone() {
        stages.collect(node);
    }

    let mut commands = Vec::new();
    for node in from_nodes {
        info!(
            "Found FROM command at line {}-{}: {:?}",
            node.start_line, node.end_line, node.original
        );

        let image = match classify(node, stages) {
            Ok(Classified::Image(image)) => image,
            Ok(Classified::Skip(name)) => {
                debug!("Skipping FROM command that references a build stage or special image: {name:?}");
                continue;
            }
            Err(err) => {
                warn!(
                    "Failed to parse FROM command at line {}: {:#}",
                    node.start_line, err
                );
                continue;
            }
        };

        commands.push(FromCommand {
            node,
            image,
            line_start: node.start_line,
            line_end: node.end_line,
        });
    }

    commands
}

#[derive(Debug, PartialEq)]
pub enum Classified<'a> {
    Image(ImageReference),
    /// A build stage or `scratch`
    Skip(&'a str),
}

pub fn classify<'a>(node: &'a Node, stages: &StageSet) -> Result<Classified<'a>> {
    let image = node
        .first_arg()
        .context("FROM command missing image reference")?;
    if image.is_empty() {
        bail!("Empty image reference in FROM command");
    }

    if stages.is_stage(image) || image.eq_ignore_ascii_case("scratch") {
        return Ok(Classified::Skip(image));
    }

    if let Some(alias) = node.stage_alias() {
        debug!("Found multi-stage build alias: {alias:?}");
    }

    let image = image
        .parse::<ImageReference>()
        .with_context(|| anyhow!("Failed to parse image reference: {image:?}"))?;
    Ok(Classified::Image(image))
}
