use anyhow::{ensure, Context, Result};
use candle_core::{DType, Tensor};

/// Mean of the unmasked token states, L2-normalized per row: `[B,T,H] -> [B,H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _seq, width) = hidden.dims3().context("hidden states must be [batch, seq, hidden]")?;
    let weights = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;

    let summed = hidden.broadcast_mul(&weights.unsqueeze(2)?)?.sum(1)?;
    let counts = weights.sum_keepdim(1)?;
    let pooled = summed.broadcast_div(&counts)?;

    let floor = if hidden.dtype() == DType::F16 { 1e-6 } else { 1e-12 };
    let norms = (pooled.sqr()?.sum_keepdim(1)?.sqrt()? + floor)?;
    let out = pooled.broadcast_div(&norms)?;
    ensure!(out.dims() == [batch, width], "pooled shape {:?}, expected [{batch}, {width}]", out.dims());
    Ok(out)
}
