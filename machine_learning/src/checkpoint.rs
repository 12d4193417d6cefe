use std::{fs, path::Path};

use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{MlErr, Result, arch::layers::TensorEntry, error::check_len};

const F32_SIZE: usize = size_of::<f32>();

/// Pairs every entry with its offset in the flat parameter slice.
fn offsets(entries: &[TensorEntry], len: usize) -> Result<Vec<(&TensorEntry, usize)>> {
    let mut offset = 0;
    let located = entries
        .iter()
        .map(|entry| {
            let start = offset;
            offset += entry.len();
            (entry, start)
        })
        .collect();

    check_len("checkpoint entries", offset, len)?;
    Ok(located)
}

/// Writes every named parameter block as an f32 tensor.
///
/// # Arguments
/// * `path` - The safetensors file to write.
/// * `entries` - The parameter blocks, in the order they appear in `params`.
/// * `params` - The flat parameters.
pub fn save<P: AsRef<Path>>(path: P, entries: &[TensorEntry], params: &[f32]) -> Result<()> {
    let views = offsets(entries, params.len())?
        .into_iter()
        .map(|(entry, start)| {
            let data = bytemuck::cast_slice(&params[start..start + entry.len()]);
            let view = TensorView::new(Dtype::F32, entry.shape.clone(), data)
                .map_err(|e| MlErr::Checkpoint(format!("{}: {e}", entry.name)))?;
            Ok((entry.name.as_str(), view))
        })
        .collect::<Result<Vec<_>>>()?;

    safetensors::serialize_to_file(
        views.iter().map(|(name, view)| (*name, view)),
        &None,
        path.as_ref(),
    )
    .map_err(|e| MlErr::Checkpoint(e.to_string()))
}

/// Copies the tensors of a checkpoint into the matching parameter blocks.
///
/// # Arguments
/// * `path` - The safetensors file to read.
/// * `entries` - The parameter blocks, in the order they appear in `params`.
/// * `params` - The flat parameters to overwrite.
/// * `filter` - Selects the entries to load by name, the rest are left untouched.
///
/// # Returns
/// The amount of tensors loaded, or an error if a selected tensor is missing from the file or
/// has a different shape or dtype.
pub fn load<P, F>(path: P, entries: &[TensorEntry], params: &mut [f32], filter: F) -> Result<usize>
where
    P: AsRef<Path>,
    F: Fn(&str) -> bool,
{
    let bytes = fs::read(path.as_ref())?;
    let tensors =
        SafeTensors::deserialize(&bytes).map_err(|e| MlErr::Checkpoint(e.to_string()))?;

    let mut loaded = 0;
    for (entry, start) in offsets(entries, params.len())? {
        if !filter(&entry.name) {
            continue;
        }

        let view = tensors
            .tensor(&entry.name)
            .map_err(|e| MlErr::Checkpoint(format!("{}: {e}", entry.name)))?;

        if view.dtype() != Dtype::F32 || view.shape() != entry.shape.as_slice() {
            return Err(MlErr::Checkpoint(format!(
                "{} is {:?} {:?}, expected F32 {:?}",
                entry.name,
                view.dtype(),
                view.shape(),
                entry.shape
            )));
        }

        let dst = &mut params[start..start + entry.len()];
        for (p, chunk) in dst.iter_mut().zip(view.data().chunks_exact(F32_SIZE)) {
            *p = bytemuck::pod_read_unaligned(chunk);
        }

        loaded += 1;
    }

    log::debug!("loaded {loaded} tensors from {}", path.as_ref().display());
    Ok(loaded)
}
