//! End-to-end registration of a stack of sections.
//!
//! The driver owns the pipeline: extract features in parallel, build each
//! section's tile graph, repair and optimize it, coarsely link consecutive
//! sections, then relax the whole stack in one final global pass. Tile
//! transforms are written back onto the input patches after every
//! optimization so callers can observe intermediate placements.

mod extract;
mod linking;

pub use extract::{extract_features, DescriptorExtractor};
pub use linking::{
    bridge_sections, coarse_register_with_retry, nearest_tile, CoarseParams, CoarseRegistration,
    CoarseSectionRegistrar,
};

use crate::config::AlignConfig;
use crate::core::Transform2D;
use crate::error::Result;
use crate::graph::{TileGraph, TileId};
use crate::matching::{CorrespondenceFinder, DescriptorSet, ModelFitter};
use crate::observer::AlignObserver;
use crate::optimize::{GlobalOptimizer, OptimizeResult};

/// One image tile as the caller knows it: an identifier, its intrinsic
/// size and its current placement.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Caller-side identifier, reported in errors and logs.
    pub id: u64,
    /// Intrinsic width in px.
    pub width: f64,
    /// Intrinsic height in px.
    pub height: f64,
    /// Placement into the shared world frame; updated in place by a run.
    pub transform: Transform2D,
}

impl Patch {
    /// Create a patch.
    pub fn new(id: u64, width: f64, height: f64, transform: Transform2D) -> Self {
        Self {
            id,
            width,
            height,
            transform,
        }
    }
}

/// One section of the stack: the patches imaged at a single depth.
#[derive(Debug, Clone, Default)]
pub struct Section {
    /// Patches in caller order.
    pub patches: Vec<Patch>,
}

impl Section {
    /// Create a section from its patches.
    pub fn new(patches: Vec<Patch>) -> Self {
        Self { patches }
    }
}

/// Per-section outcome of the intra-section pass.
#[derive(Debug, Clone)]
pub struct SectionOutcome {
    /// Index of the section in the input stack.
    pub section: usize,
    /// Connected components after edge building and repair.
    pub components: usize,
    /// Result of the per-section optimization.
    pub optimize: OptimizeResult,
}

/// Summary of a whole registration run.
#[derive(Debug, Clone, Default)]
pub struct RegistrationReport {
    /// One outcome per input section, in order.
    pub sections: Vec<SectionOutcome>,
    /// Consecutive section pairs for which coarse registration failed at
    /// the size ceiling; their relative placement is unconstrained.
    pub unlinked_pairs: Vec<(usize, usize)>,
    /// Connected components of the full stack before the global pass.
    pub global_components: usize,
    /// Result of the final global optimization; `None` for empty input.
    pub global: Option<OptimizeResult>,
}

/// Registers a stack of sections into one shared world frame.
pub struct LayerRegistrationDriver {
    config: AlignConfig,
    fitter: ModelFitter,
}

impl LayerRegistrationDriver {
    /// Create a driver for the given configuration.
    pub fn new(config: AlignConfig) -> Self {
        Self {
            config,
            fitter: ModelFitter::default(),
        }
    }

    /// Run the full pipeline over `sections`, mutating their patch
    /// transforms in place.
    ///
    /// Sections are processed in stack order; each is registered
    /// internally before being linked to its predecessor. The only hard
    /// failure is a feature-extraction error; everything else degrades to
    /// warnings in the returned report.
    pub fn run(
        &self,
        sections: &mut [Section],
        extractor: &dyn DescriptorExtractor,
        finder: &dyn CorrespondenceFinder,
        registrar: &dyn CoarseSectionRegistrar,
        observer: &dyn AlignObserver,
    ) -> Result<RegistrationReport> {
        let kind = self.config.model;
        let ratio = self.config.ratio_threshold.0;
        let optimizer = GlobalOptimizer::new(self.config.optimizer);

        let mut graph = TileGraph::new();
        let mut descriptors: Vec<DescriptorSet> = Vec::new();
        let mut scopes: Vec<Vec<TileId>> = Vec::new();
        let mut report = RegistrationReport::default();

        for s in 0..sections.len() {
            observer.status(&format!(
                "section {}/{}: extracting features",
                s + 1,
                sections.len()
            ));
            let sets = extract_features(&sections[s].patches, extractor, self.config.threads)?;

            let scope: Vec<TileId> = sections[s]
                .patches
                .iter()
                .map(|p| graph.add_tile(p.id, p.width, p.height, p.transform))
                .collect();
            descriptors.extend(sets);

            observer.status(&format!("section {}: matching tiles", s + 1));
            let pairs = if self.config.prealigned {
                graph.overlapping_pairs(&scope)
            } else {
                graph.all_pairs(&scope)
            };
            let edges = graph.build_edges(
                &pairs,
                &descriptors,
                finder,
                &self.fitter,
                kind,
                ratio,
                &self.config.intra,
            );
            log::info!(
                "section {}: {} tiles, {} candidate pairs, {} edges",
                s,
                scope.len(),
                pairs.len(),
                edges
            );

            let mut components = graph.connected_components(&scope);
            if components.len() > 1 && self.config.prealigned {
                components = graph.repair_disconnected(&components, &scope);
            }
            if components.len() > 1 {
                log::warn!(
                    "section {}: {} disconnected components remain",
                    s,
                    components.len()
                );
            }

            observer.status(&format!("section {}: optimizing", s + 1));
            let anchors = graph.select_anchors(&components);
            let result = optimizer.optimize(
                &mut graph,
                &scope,
                &anchors,
                kind,
                self.config.intra.max_epsilon,
                observer,
            );
            if !result.converged() {
                log::warn!(
                    "section {}: optimization stopped at {} iterations, mean {:.3} px",
                    s,
                    result.iterations,
                    result.mean_displacement
                );
            }

            write_back(&graph, &mut sections[s], &scope);
            observer.section_updated(s);
            report.sections.push(SectionOutcome {
                section: s,
                components: components.len(),
                optimize: result,
            });

            if s > 0 {
                self.link_to_previous(
                    &mut graph,
                    &descriptors,
                    sections,
                    &scopes[s - 1],
                    &scope,
                    s,
                    finder,
                    registrar,
                    &mut report,
                );
                write_back(&graph, &mut sections[s], &scope);
                observer.section_updated(s);
            }
            scopes.push(scope);
        }

        if graph.is_empty() {
            return Ok(report);
        }

        observer.status("global optimization");
        let all: Vec<TileId> = (0..graph.len()).collect();
        let components = graph.connected_components(&all);
        if components.len() > 1 {
            log::warn!("stack splits into {} disconnected groups", components.len());
        }
        let anchors = graph.select_anchors(&components);
        let global = optimizer.optimize(
            &mut graph,
            &all,
            &anchors,
            kind,
            self.config.cross.max_epsilon,
            observer,
        );
        log::info!(
            "global pass: {} iterations, mean {:.3} px, {:?}",
            global.iterations,
            global.mean_displacement,
            global.termination
        );
        report.global_components = components.len();
        report.global = Some(global);

        for (s, scope) in scopes.iter().enumerate() {
            write_back(&graph, &mut sections[s], scope);
            observer.section_updated(s);
        }
        Ok(report)
    }

    /// Coarsely register section `s` onto section `s - 1`, apply the
    /// correction, bridge the two graphs and search for direct
    /// cross-section tile correspondences.
    #[allow(clippy::too_many_arguments)]
    fn link_to_previous(
        &self,
        graph: &mut TileGraph,
        descriptors: &[DescriptorSet],
        sections: &[Section],
        prev_scope: &[TileId],
        scope: &[TileId],
        s: usize,
        finder: &dyn CorrespondenceFinder,
        registrar: &dyn CoarseSectionRegistrar,
        report: &mut RegistrationReport,
    ) {
        let registration = match coarse_register_with_retry(
            registrar,
            &sections[s - 1],
            &sections[s],
            &self.config.coarse,
        ) {
            Some(r) => r,
            None => {
                log::warn!("sections {} and {} left unlinked", s - 1, s);
                report.unlinked_pairs.push((s - 1, s));
                return;
            }
        };

        for &id in scope {
            graph.pre_concat_transform(id, &registration.affine);
        }
        let bridges = bridge_sections(graph, prev_scope, scope, &registration);
        if bridges == 0 {
            log::warn!("sections {} and {}: coarse fit yielded no bridges", s - 1, s);
        }

        // with the coarse correction applied the overlap test is valid
        // across the two sections
        let pairs = graph.cross_pairs(prev_scope, scope, true);
        let edges = graph.build_edges(
            &pairs,
            descriptors,
            finder,
            &self.fitter,
            self.config.model,
            self.config.ratio_threshold.0,
            &self.config.cross,
        );
        log::info!(
            "sections {} and {}: {} bridges, {} direct edges",
            s - 1,
            s,
            bridges,
            edges
        );
    }
}

fn write_back(graph: &TileGraph, section: &mut Section, scope: &[TileId]) {
    for (patch, &id) in section.patches.iter_mut().zip(scope) {
        patch.transform = graph.transform(id);
    }
}
