//! Mesh representation for indexed triangle geometry
//!
//! CPU-side vertex and index data handed to the uploader. Nothing here knows
//! about Vulkan beyond the index width; the backend-specific vertex input
//! layout lives in `vulkan/vertex_layout.rs`.
//!
//! # Validation
//!
//! A mesh is accepted for upload only if it has at least one vertex, a
//! non-empty index list whose length is a multiple of three, and every index
//! points at an existing vertex. Index order is preserved byte for byte.

/// Vertex with a clip-space position and a per-vertex colour
///
/// # Memory Layout
/// `#[repr(C)]` with no padding: 3 floats of position followed by 3 floats of
/// colour, 24 bytes per vertex. The z component is the depth tested against
/// the depth attachment, 0.0 nearest.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Clip-space position
    pub pos: [f32; 3],
    /// Linear RGB colour
    pub color: [f32; 3],
}

// Plain `f32` fields with no padding.
unsafe impl bytemuck::Zeroable for Vertex {}
unsafe impl bytemuck::Pod for Vertex {}

impl Vertex {
    /// Vertex at `pos` (x, y, depth) with colour `color`
    pub const fn new(pos: [f32; 3], color: [f32; 3]) -> Self {
        Self { pos, color }
    }
}

/// Index data in one of the two widths the draw path supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indices {
    /// 16-bit indices, for meshes of at most 65536 vertices
    U16(Vec<u16>),
    /// 32-bit indices
    U32(Vec<u32>),
}

impl Indices {
    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U16(indices) => indices.len(),
            Self::U32(indices) => indices.len(),
        }
    }

    /// Whether there are no indices at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes in native order, ready for a staging copy
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(indices) => bytemuck::cast_slice(indices),
            Self::U32(indices) => bytemuck::cast_slice(indices),
        }
    }

    /// Largest index, if any
    pub fn max_index(&self) -> Option<u32> {
        match self {
            Self::U16(indices) => indices.iter().copied().max().map(u32::from),
            Self::U32(indices) => indices.iter().copied().max(),
        }
    }

    /// Width of a single index
    pub fn index_type(&self) -> IndexType {
        match self {
            Self::U16(_) => IndexType::U16,
            Self::U32(_) => IndexType::U32,
        }
    }
}

impl From<Vec<u16>> for Indices {
    fn from(indices: Vec<u16>) -> Self {
        Self::U16(indices)
    }
}

impl From<Vec<u32>> for Indices {
    fn from(indices: Vec<u32>) -> Self {
        Self::U32(indices)
    }
}

/// Index width recorded on an uploaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// `u16` indices
    U16,
    /// `u32` indices
    U32,
}

impl IndexType {
    /// Bytes per index
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Why a mesh cannot be uploaded
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshDefect {
    /// The vertex list is empty
    #[error("mesh has no vertices")]
    NoVertices,

    /// The index list is empty
    #[error("mesh has no indices")]
    NoIndices,

    /// The index list ends partway through a triangle
    #[error("index count {index_count} is not a multiple of 3")]
    IncompleteTriangle { index_count: usize },

    /// An index points past the end of the vertex list
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

/// Vertex and index data for one indexed triangle list
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Interleaved vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Indices,
}

impl Mesh {
    /// Create a mesh from raw data
    pub fn new(vertices: Vec<Vertex>, indices: impl Into<Indices>) -> Self {
        Self {
            vertices,
            indices: indices.into(),
        }
    }

    /// Axis-aligned quad from `min` to `max` at `depth`, two clockwise triangles
    ///
    /// Corners go `min`, (max x, min y), `max`, (min x, max y), one colour
    /// each. Vulkan clip space has +y pointing down, so that order is
    /// clockwise on screen. Every corner shares the same depth, 0.0 nearest
    /// and 1.0 farthest.
    pub fn quad(min: [f32; 2], max: [f32; 2], depth: f32, colors: [[f32; 3]; 4]) -> Self {
        let vertices = vec![
            Vertex::new([min[0], min[1], depth], colors[0]),
            Vertex::new([max[0], min[1], depth], colors[1]),
            Vertex::new([max[0], max[1], depth], colors[2]),
            Vertex::new([min[0], max[1], depth], colors[3]),
        ];
        Self::new(vertices, vec![0u16, 1, 2, 2, 3, 0])
    }

    /// Check the mesh can be drawn as an indexed triangle list
    pub fn validate(&self) -> Result<(), MeshDefect> {
        if self.vertices.is_empty() {
            return Err(MeshDefect::NoVertices);
        }
        if self.indices.is_empty() {
            return Err(MeshDefect::NoIndices);
        }
        let index_count = self.indices.len();
        if index_count % 3 != 0 {
            return Err(MeshDefect::IncompleteTriangle { index_count });
        }
        match self.indices.max_index() {
            Some(index) if index as usize >= self.vertices.len() => Err(MeshDefect::IndexOutOfRange {
                index,
                vertex_count: self.vertices.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Number of indices drawn
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}
