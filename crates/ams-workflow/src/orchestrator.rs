//! Evaluation orchestrator.
//!
//! For every material, one cycle runs:
//!
//! ```text
//! active = count(indicator column)
//! Skipped : active == 0                                   -> nothing
//! Sparse  : !device && pack_sparse && active < elements   -> gather rows,
//!           pipeline on compacted buffers, scatter 4 outputs back
//! Dense   : otherwise                                     -> pipeline on slabs
//!
//! pipeline = uq.evaluate -> surrogate.evaluate -> physics.evaluate_filtered
//!            [-> store.store]
//! ```
//!
//! Materials run one after another; each owns its collaborators, so no
//! state is shared between materials.

use crate::strategy::{EvaluationReport, MaterialReport, Strategy};
use crate::tensor::{EosFields, FieldTensor, IndicatorMatrix};
use ams_compute::MemoryBroker;
use ams_compute::pack::{build_index, gather_rows, scatter_rows};
use ams_core::{
    EosOutputs, Error, EvaluationConfig, OfflineStore, PhysicsSolver, Real, Residency, Result,
    SurrogateModel, UncertaintyClassifier,
};

/// The collaborators owned by one material.
pub struct MaterialSlot {
    /// Uncertainty classifier.
    pub uq: Box<dyn UncertaintyClassifier>,
    /// Surrogate model.
    pub surrogate: Box<dyn SurrogateModel>,
    /// Physics solver used as fallback on uncertain samples.
    pub physics: Box<dyn PhysicsSolver>,
    /// Optional offline store receiving every evaluated sample.
    pub store: Option<Box<dyn OfflineStore>>,
}

impl MaterialSlot {
    /// Slot without an offline store.
    pub fn new(
        uq: Box<dyn UncertaintyClassifier>,
        surrogate: Box<dyn SurrogateModel>,
        physics: Box<dyn PhysicsSolver>,
    ) -> Self {
        Self { uq, surrogate, physics, store: None }
    }

    /// Attach an offline store.
    pub fn with_store(mut self, store: Box<dyn OfflineStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Three-stage pipeline on buffers of one common length.
    fn run(
        &mut self,
        density: &[Real],
        energy: &[Real],
        uncertain: &mut [bool],
        mut outputs: EosOutputs<'_>,
    ) -> Result<()> {
        uncertain.fill(false);
        self.uq.evaluate(density, energy, uncertain)?;
        {
            let mut outs = outputs.as_array();
            self.surrogate.evaluate(&[density, energy], &mut outs)?;
        }
        self.physics.evaluate_filtered(density, energy, uncertain, outputs.reborrow())?;

        if let Some(store) = self.store.as_mut() {
            let outs: [&[Real]; 4] =
                [outputs.pressure, outputs.soundspeed2, outputs.bulkmod, outputs.temperature];
            let stored = store.store(&[density, energy], &outs);
            if let Err(e) = stored {
                log::warn!("offline store rejected {} samples: {e}", density.len());
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MaterialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialSlot").field("has_store", &self.store.is_some()).finish()
    }
}

/// Runs evaluation cycles over every material.
#[derive(Debug)]
pub struct Evaluator {
    config: EvaluationConfig,
    broker: MemoryBroker,
    materials: Vec<MaterialSlot>,
}

impl Evaluator {
    /// Build an evaluator with one slot per configured material.
    pub fn new(
        config: EvaluationConfig,
        broker: MemoryBroker,
        materials: Vec<MaterialSlot>,
    ) -> Result<Self> {
        config.validate()?;
        if materials.len() != config.num_materials {
            return Err(Error::SizeMismatch {
                what: "material slots",
                expected: config.num_materials,
                actual: materials.len(),
            });
        }
        Ok(Self { config, broker, materials })
    }

    /// Active configuration.
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Broker used for scratch allocations.
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    fn check_shape(&self, what: &'static str, shape: (usize, usize, usize)) -> Result<()> {
        let c = &self.config;
        let expected = (c.num_qpts, c.num_elements, c.num_materials);
        if shape != expected {
            return Err(Error::SizeMismatch {
                what,
                expected: expected.0 * expected.1 * expected.2,
                actual: shape.0 * shape.1 * shape.2,
            });
        }
        Ok(())
    }

    /// Run one cycle across all materials.
    ///
    /// `density` and `energy` are read; `outputs` is written only where a
    /// material is evaluated (every element of a dense material, the active
    /// elements of a sparse one). A collaborator error stops the cycle and is
    /// returned unmodified.
    pub fn evaluate(
        &mut self,
        density: &FieldTensor,
        energy: &FieldTensor,
        indicators: &IndicatorMatrix,
        outputs: &mut EosFields,
    ) -> Result<EvaluationReport> {
        self.check_shape("density tensor", density.shape())?;
        self.check_shape("energy tensor", energy.shape())?;
        self.check_shape("output tensors", outputs.shape()?)?;
        self.check_shape(
            "indicator matrix",
            (self.config.num_qpts, indicators.num_elements(), indicators.num_materials()),
        )?;

        let total = self.config.num_elements;
        let mut report = EvaluationReport::default();
        for m in 0..self.config.num_materials {
            let active = indicators.active_count(m);
            let strategy = Strategy::choose(&self.config, active, total);
            log::debug!("material {m}: {active}/{total} active elements, {strategy:?}");
            match strategy {
                Strategy::Skipped => {}
                Strategy::Sparse => self.evaluate_sparse(m, density, energy, indicators, outputs)?,
                Strategy::Dense => self.evaluate_dense(m, density, energy, outputs)?,
            }
            report.materials.push(MaterialReport { material: m, strategy, active_elements: active });
        }
        Ok(report)
    }

    fn evaluate_dense(
        &mut self,
        m: usize,
        density: &FieldTensor,
        energy: &FieldTensor,
        outputs: &mut EosFields,
    ) -> Result<()> {
        let n = self.config.samples_per_material();
        let mut uncertain = self.broker.allocate::<bool>(Residency::Host, n)?;
        self.materials[m].run(
            density.material(m),
            energy.material(m),
            uncertain.host_mut()?,
            outputs.material_mut(m),
        )
    }

    fn evaluate_sparse(
        &mut self,
        m: usize,
        density: &FieldTensor,
        energy: &FieldTensor,
        indicators: &IndicatorMatrix,
        outputs: &mut EosFields,
    ) -> Result<()> {
        let width = self.config.num_qpts;
        let index = build_index(indicators.column(m), true)?;
        let n = index.len() * width;

        let mut rho = self.broker.allocate::<Real>(Residency::Host, n)?;
        let mut e = self.broker.allocate::<Real>(Residency::Host, n)?;
        gather_rows(&index, width, density.material(m), rho.host_mut()?)?;
        gather_rows(&index, width, energy.material(m), e.host_mut()?)?;

        let mut dense_out = [
            self.broker.allocate::<Real>(Residency::Host, n)?,
            self.broker.allocate::<Real>(Residency::Host, n)?,
            self.broker.allocate::<Real>(Residency::Host, n)?,
            self.broker.allocate::<Real>(Residency::Host, n)?,
        ];
        let mut uncertain = self.broker.allocate::<bool>(Residency::Host, n)?;
        {
            let [p, c2, k, t] = &mut dense_out;
            let dense = EosOutputs::new(p.host_mut()?, c2.host_mut()?, k.host_mut()?, t.host_mut()?);
            self.materials[m].run(rho.host()?, e.host()?, uncertain.host_mut()?, dense)?;
        }

        let mut full = outputs.material_mut(m);
        for (src, dst) in dense_out.iter().zip(full.as_array()) {
            scatter_rows(&index, width, src.host()?, dst)?;
        }
        Ok(())
    }
}
