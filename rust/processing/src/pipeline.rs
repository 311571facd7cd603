// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction run: ingest, lift, stitch, triangulate, walls, assemble

use crate::assembler::{GeometryAssembler, ReconstructionOutput};
use crate::collector::SampleCollector;
use crate::error::{Error, Result};
use crate::lifter::{LiftedFeature, VertexLifter};
use crate::report::{FootprintFailure, RunReport, Stage};
use crate::source::{PointSource, Scene};
use crate::stitcher::TileStitcher;
use crate::store::FootprintStore;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use terralift_core::{Footprint, Lod, Policies};
use terralift_geometry::{extrude_block, triangulate_surface, FootprintIndex, JumpEdgeIndex, Mesh, SteinerOptions, Tin};

/// One reconstruction run over a fixed set of footprints
pub struct Reconstruction {
    store: Arc<FootprintStore>,
    policies: Arc<Policies>,
    collector: SampleCollector,
    delivered: AtomicUsize,
    report: RunReport,
    ingest_ms: AtomicUsize,
}

impl Reconstruction {
    /// Prepare footprints: normalize rings, apply the extent, build the index.
    ///
    /// An invalid extent is logged and ignored. Fails when no footprint is
    /// left to reconstruct.
    pub fn new(footprints: Vec<Footprint>, policies: Policies) -> Result<Self> {
        let mut report = RunReport {
            footprints_total: footprints.len(),
            ..Default::default()
        };

        let extent = match policies.options().valid_extent() {
            Some(Ok(extent)) => Some(extent),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Invalid extent, using all footprints");
                report.extent_ignored = true;
                None
            }
            None => None,
        };

        let mut kept = Vec::with_capacity(footprints.len());
        for footprint in footprints {
            let footprint = footprint.normalized();
            if let Some(extent) = &extent {
                if !extent.admits(&footprint.bbox()) {
                    report.footprints_outside_extent += 1;
                    continue;
                }
            }
            kept.push(footprint);
        }
        if kept.is_empty() {
            return Err(terralift_core::Error::NoFootprints.into());
        }

        let store = Arc::new(FootprintStore::new(kept));
        let index = Arc::new(FootprintIndex::build(store.all_bounds().iter().copied())?);
        let policies = Arc::new(policies);
        let collector = SampleCollector::new(Arc::clone(&store), index, Arc::clone(&policies));

        tracing::info!(
            footprints = store.len(),
            outside_extent = report.footprints_outside_extent,
            "Footprints indexed"
        );

        Ok(Self {
            store,
            policies,
            collector,
            delivered: AtomicUsize::new(0),
            report,
            ingest_ms: AtomicUsize::new(0),
        })
    }

    pub fn footprint_count(&self) -> usize {
        self.store.len()
    }

    /// Feed one point. Safe to call from several threads.
    pub fn ingest_point(&self, x: f64, y: f64, z: f64, classification: u8) -> usize {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.collector.ingest(x, y, z, classification)
    }

    /// Ingest sources in parallel, each one streamed in order
    pub fn ingest_sources(&self, sources: &[PointSource]) -> usize {
        let start = Instant::now();
        let recorded: usize = sources
            .par_iter()
            .map(|source| {
                let stats = self.collector.ingest_source(source);
                self.delivered.fetch_add(stats.delivered, Ordering::Relaxed);
                stats.recorded
            })
            .sum();
        let elapsed = start.elapsed().as_millis() as usize;
        self.ingest_ms.fetch_add(elapsed, Ordering::Relaxed);
        tracing::info!(
            sources = sources.len(),
            samples = recorded,
            ingest_time_ms = elapsed,
            "Point sources ingested"
        );
        recorded
    }

    /// Lift, stitch, triangulate and assemble every footprint
    pub fn run(self) -> Result<ReconstructionOutput> {
        let total_start = Instant::now();
        let Self {
            store,
            policies,
            delivered,
            mut report,
            ingest_ms,
            ..
        } = self;

        report.points_delivered = delivered.into_inner();
        report.timings.ingest_ms = ingest_ms.into_inner() as u64;
        if report.points_delivered == 0 {
            return Err(terralift_core::Error::NoElevationData.into());
        }
        report.samples_recorded = store.total_samples();
        let options = policies.options().clone();

        // Lift
        let lift_start = Instant::now();
        let lifter = VertexLifter::new(Arc::clone(&policies));
        let results: Vec<std::result::Result<LiftedFeature, (usize, Error)>> = (0..store.len())
            .into_par_iter()
            .map(|i| {
                let samples = store.samples(i);
                lifter.lift(i, store.footprint(i), &samples).map_err(|e| (i, e))
            })
            .collect();
        let mut lifted = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(feature) => lifted.push(feature),
                Err((i, e)) => fail(&mut report, store.footprint(i), Stage::Lift, &e),
            }
        }
        for feature in &lifted {
            report.outliers_discarded += feature.outliers.discarded;
        }
        report.timings.lift_ms = lift_start.elapsed().as_millis() as u64;
        tracing::info!(
            lifted = lifted.len(),
            failed = report.failures.len(),
            outliers_discarded = report.outliers_discarded,
            lift_time_ms = report.timings.lift_ms,
            "Lift phase complete"
        );

        // Stitch
        if options.stitching {
            let stitch_start = Instant::now();
            let stats = TileStitcher::new(options.snap_tolerance, options.threshold_jump_edges).stitch(&mut lifted);
            report.stitch_groups = stats.groups;
            report.vertices_stitched = stats.vertices_changed;
            report.timings.stitch_ms = stitch_start.elapsed().as_millis() as u64;
            tracing::info!(
                groups = stats.groups,
                vertices_changed = stats.vertices_changed,
                stitch_time_ms = report.timings.stitch_ms,
                "Stitch phase complete"
            );
        }

        // Triangulate
        let tri_start = Instant::now();
        let meshes: Vec<Result<Mesh>> = lifted
            .par_iter()
            .map(|feature| triangulate_feature(feature, &policies))
            .collect();
        let mut built: Vec<(LiftedFeature, Mesh)> = Vec::with_capacity(lifted.len());
        for (feature, mesh) in lifted.into_iter().zip(meshes) {
            match mesh {
                Ok(mesh) => built.push((feature, mesh)),
                Err(e) => fail(&mut report, store.footprint(feature.index), Stage::Triangulate, &e),
            }
        }
        report.timings.triangulate_ms = tri_start.elapsed().as_millis() as u64;
        tracing::info!(
            meshes = built.len(),
            triangles = built.iter().map(|(_, m)| m.triangle_count()).sum::<usize>(),
            triangulate_time_ms = report.timings.triangulate_ms,
            "Triangulation phase complete"
        );

        // Vertical walls
        if options.use_vertical_walls {
            let walls_start = Instant::now();
            let mut edges = JumpEdgeIndex::new(options.snap_tolerance);
            for (slot, (feature, mesh)) in built.iter().enumerate() {
                if is_block(feature, &policies) {
                    edges.add_rings(slot, &feature.ring_points());
                } else {
                    edges.add_mesh(slot, mesh);
                }
            }
            for (slot, walls) in edges.walls(options.threshold_jump_edges) {
                report.wall_triangles += walls.triangle_count();
                built[slot].1.merge(&walls);
            }
            report.timings.walls_ms = walls_start.elapsed().as_millis() as u64;
            tracing::info!(
                edges = edges.edge_count(),
                wall_triangles = report.wall_triangles,
                walls_time_ms = report.timings.walls_ms,
                "Vertical walls complete"
            );
        }

        // Assemble
        let mut assembler = GeometryAssembler::with_capacity(built.len());
        for (feature, mesh) in built {
            assembler.add(store.footprint(feature.index), &feature, mesh);
        }
        for i in 0..store.len() {
            store.release(i);
        }

        report.timings.total_ms = report.timings.ingest_ms + total_start.elapsed().as_millis() as u64;
        let output = assembler.finish(report);
        tracing::info!(
            reconstructed = output.report.footprints_reconstructed,
            failed = output.report.failed_count(),
            total_time_ms = output.report.timings.total_ms,
            "Reconstruction complete"
        );
        Ok(output)
    }
}

/// Footprints extruded into LoD1 blocks
fn is_block(feature: &LiftedFeature, policies: &Policies) -> bool {
    matches!(
        &policies.get(feature.class).building,
        Some(b) if b.lod == Lod::Lod1 && b.triangulate
    )
}

/// Mesh for one lifted feature
fn triangulate_feature(feature: &LiftedFeature, policies: &Policies) -> Result<Mesh> {
    let policy = policies.get(feature.class);
    let rings = feature.ring_points();

    if let Some(building) = &policy.building {
        if !building.triangulate {
            return Ok(Mesh::new());
        }
        return Ok(match building.lod {
            Lod::Lod0 => Tin::from_rings(&rings)?.into_mesh(),
            Lod::Lod1 => {
                let roof = feature.roof_z.or_else(|| feature.max_z()).ok_or(Error::NoData)?;
                extrude_block(&rings, roof, building.include_floor)?
            }
        });
    }

    let options = policy.tin.as_ref().map(SteinerOptions::from).unwrap_or_default();
    Ok(triangulate_surface(&rings, &feature.interior, &options)?)
}

fn fail(report: &mut RunReport, footprint: &Footprint, stage: Stage, error: &Error) {
    tracing::warn!(
        id = %footprint.id,
        class = %footprint.class,
        stage = ?stage,
        error = %error,
        "Footprint failed"
    );
    report
        .failures
        .push(FootprintFailure::new(footprint.id.clone(), footprint.class, stage, error));
}

/// Run a whole scene: index footprints, ingest every source, reconstruct
pub fn reconstruct(scene: Scene, policies: Policies) -> Result<ReconstructionOutput> {
    let Scene { footprints, sources } = scene;
    let run = Reconstruction::new(footprints, policies)?;
    run.ingest_sources(&sources);
    run.run()
}
