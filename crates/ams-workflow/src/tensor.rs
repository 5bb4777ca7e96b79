//! Field tensors and the indicator matrix.
//!
//! Both use a column-major layout with the material axis slowest:
//!
//! ```text
//! FieldTensor[q, e, m]   -> data[q + Q * (e + E * m)]
//! IndicatorMatrix[e, m]  -> data[e + E * m]
//! ```
//!
//! so one material is a contiguous slab of `E` rows, each row holding the
//! `Q` quadrature-point values of one element.

use ams_core::{EosOutputs, Error, Real, Result};
use serde::{Deserialize, Serialize};

/// `[quadrature-points × elements × materials]` field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldTensorDto")]
pub struct FieldTensor {
    num_qpts: usize,
    num_elements: usize,
    num_materials: usize,
    data: Vec<Real>,
}

/// DTO for serde: deserialization is length-checked by [`FieldTensor::from_vec`].
#[derive(Deserialize)]
struct FieldTensorDto {
    num_qpts: usize,
    num_elements: usize,
    num_materials: usize,
    data: Vec<Real>,
}

impl TryFrom<FieldTensorDto> for FieldTensor {
    type Error = Error;

    fn try_from(dto: FieldTensorDto) -> Result<Self> {
        Self::from_vec(dto.num_qpts, dto.num_elements, dto.num_materials, dto.data)
    }
}

impl FieldTensor {
    /// Zero-filled tensor.
    pub fn zeros(num_qpts: usize, num_elements: usize, num_materials: usize) -> Self {
        Self::filled(num_qpts, num_elements, num_materials, 0.0)
    }

    /// Tensor with every value set to `value`.
    pub fn filled(num_qpts: usize, num_elements: usize, num_materials: usize, value: Real) -> Self {
        Self {
            num_qpts,
            num_elements,
            num_materials,
            data: vec![value; num_qpts * num_elements * num_materials],
        }
    }

    /// Wrap existing column-major data.
    pub fn from_vec(
        num_qpts: usize,
        num_elements: usize,
        num_materials: usize,
        data: Vec<Real>,
    ) -> Result<Self> {
        let expected = num_qpts * num_elements * num_materials;
        if data.len() != expected {
            return Err(Error::SizeMismatch { what: "field tensor", expected, actual: data.len() });
        }
        Ok(Self { num_qpts, num_elements, num_materials, data })
    }

    /// Quadrature points per element.
    pub fn num_qpts(&self) -> usize {
        self.num_qpts
    }

    /// Number of elements.
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Number of materials.
    pub fn num_materials(&self) -> usize {
        self.num_materials
    }

    /// `(num_qpts, num_elements, num_materials)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_qpts, self.num_elements, self.num_materials)
    }

    fn offset(&self, q: usize, e: usize, m: usize) -> usize {
        q + self.num_qpts * (e + self.num_elements * m)
    }

    /// Value at `(q, e, m)`. Panics when out of range.
    pub fn get(&self, q: usize, e: usize, m: usize) -> Real {
        self.data[self.offset(q, e, m)]
    }

    /// Set the value at `(q, e, m)`. Panics when out of range.
    pub fn set(&mut self, q: usize, e: usize, m: usize, value: Real) {
        let i = self.offset(q, e, m);
        self.data[i] = value;
    }

    /// Contiguous slab of material `m` (`E` rows of `Q` values).
    pub fn material(&self, m: usize) -> &[Real] {
        let len = self.num_qpts * self.num_elements;
        &self.data[m * len..(m + 1) * len]
    }

    /// Mutable slab of material `m`.
    pub fn material_mut(&mut self, m: usize) -> &mut [Real] {
        let len = self.num_qpts * self.num_elements;
        &mut self.data[m * len..(m + 1) * len]
    }

    /// Raw column-major data.
    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    /// Mutable raw column-major data.
    pub fn as_mut_slice(&mut self) -> &mut [Real] {
        &mut self.data
    }
}

/// `[elements × materials]` presence flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndicatorMatrixDto")]
pub struct IndicatorMatrix {
    num_elements: usize,
    num_materials: usize,
    data: Vec<bool>,
}

#[derive(Deserialize)]
struct IndicatorMatrixDto {
    num_elements: usize,
    num_materials: usize,
    data: Vec<bool>,
}

impl TryFrom<IndicatorMatrixDto> for IndicatorMatrix {
    type Error = Error;

    fn try_from(dto: IndicatorMatrixDto) -> Result<Self> {
        Self::from_vec(dto.num_elements, dto.num_materials, dto.data)
    }
}

impl IndicatorMatrix {
    /// All-false matrix.
    pub fn new(num_elements: usize, num_materials: usize) -> Self {
        Self { num_elements, num_materials, data: vec![false; num_elements * num_materials] }
    }

    /// Wrap existing flags laid out as `data[e + E * m]`.
    pub fn from_vec(num_elements: usize, num_materials: usize, data: Vec<bool>) -> Result<Self> {
        let expected = num_elements * num_materials;
        if data.len() != expected {
            return Err(Error::SizeMismatch { what: "indicator matrix", expected, actual: data.len() });
        }
        Ok(Self { num_elements, num_materials, data })
    }

    /// Build from per-material columns of equal length.
    pub fn from_columns(columns: &[Vec<bool>]) -> Result<Self> {
        let num_elements = columns.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(num_elements * columns.len());
        for column in columns {
            if column.len() != num_elements {
                return Err(Error::SizeMismatch {
                    what: "indicator column",
                    expected: num_elements,
                    actual: column.len(),
                });
            }
            data.extend_from_slice(column);
        }
        Ok(Self { num_elements, num_materials: columns.len(), data })
    }

    /// Number of elements.
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Number of materials.
    pub fn num_materials(&self) -> usize {
        self.num_materials
    }

    /// Flag of `(e, m)`. Panics when out of range.
    pub fn get(&self, e: usize, m: usize) -> bool {
        self.data[e + self.num_elements * m]
    }

    /// Set the flag of `(e, m)`. Panics when out of range.
    pub fn set(&mut self, e: usize, m: usize, active: bool) {
        self.data[e + self.num_elements * m] = active;
    }

    /// Column of material `m`, one flag per element.
    pub fn column(&self, m: usize) -> &[bool] {
        &self.data[m * self.num_elements..(m + 1) * self.num_elements]
    }

    /// Mutable column of material `m`.
    pub fn column_mut(&mut self, m: usize) -> &mut [bool] {
        &mut self.data[m * self.num_elements..(m + 1) * self.num_elements]
    }

    /// Number of elements where material `m` is present.
    pub fn active_count(&self, m: usize) -> usize {
        self.column(m).iter().filter(|&&a| a).count()
    }
}

/// The four output tensors written by one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EosFields {
    /// Pressure.
    pub pressure: FieldTensor,
    /// Squared sound speed.
    pub soundspeed2: FieldTensor,
    /// Bulk modulus.
    pub bulkmod: FieldTensor,
    /// Temperature.
    pub temperature: FieldTensor,
}

impl EosFields {
    /// Four tensors of the given shape, every value set to `value`.
    pub fn filled(num_qpts: usize, num_elements: usize, num_materials: usize, value: Real) -> Self {
        let t = FieldTensor::filled(num_qpts, num_elements, num_materials, value);
        Self { pressure: t.clone(), soundspeed2: t.clone(), bulkmod: t.clone(), temperature: t }
    }

    /// Shared shape, or a size mismatch naming the first disagreeing tensor.
    pub fn shape(&self) -> Result<(usize, usize, usize)> {
        let shape = self.pressure.shape();
        for (what, t) in [
            ("soundspeed2 tensor", &self.soundspeed2),
            ("bulkmod tensor", &self.bulkmod),
            ("temperature tensor", &self.temperature),
        ] {
            if t.shape() != shape {
                return Err(Error::SizeMismatch {
                    what,
                    expected: shape.0 * shape.1 * shape.2,
                    actual: t.as_slice().len(),
                });
            }
        }
        Ok(shape)
    }

    /// Output slabs of material `m`.
    pub fn material_mut(&mut self, m: usize) -> EosOutputs<'_> {
        EosOutputs::new(
            self.pressure.material_mut(m),
            self.soundspeed2.material_mut(m),
            self.bulkmod.material_mut(m),
            self.temperature.material_mut(m),
        )
    }
}
