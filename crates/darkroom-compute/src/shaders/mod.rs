//! WGSL shader sources for the compute executors.
//!
//! Images travel as packed RGBA8 words, one `u32` per pixel with red in the
//! low byte, so buffers upload and download as raw bytes on little-endian
//! buffer layout.

/// Tone curve remap through a 256-entry table.
pub const TONE_CURVE: &str = r#"
@group(0) @binding(0) var<storage, read> src: array<u32>;
@group(0) @binding(1) var<storage, read_write> dst: array<u32>;
@group(0) @binding(2) var<uniform> dims: vec4<u32>;  // w, h, 0, 0
@group(0) @binding(3) var<storage, read> curve: array<u32>;

fn remap(v: u32) -> u32 {
    return curve[min(v, 255u)] & 255u;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let x = id.x;
    let y = id.y;
    if x >= dims.x || y >= dims.y { return; }

    let i = y * dims.x + x;
    let px = src[i];

    let r = remap(px & 255u);
    let g = remap((px >> 8u) & 255u);
    let b = remap((px >> 16u) & 255u);
    let a = (px >> 24u) & 255u;

    dst[i] = r | (g << 8u) | (b << 16u) | (a << 24u);
}
"#;

/// One mask pass: blend the running result toward the adjusted image.
pub const MASK_BLEND: &str = r#"
struct MaskParams {
    dims: vec4<u32>,    // w, h, kind (0 linear, 1 radial), invert
    shape: vec4<f32>,   // linear: sx, sy, ex, ey; radial: cx, cy, inner, outer
    params: vec4<f32>,  // opacity, 0, 0, 0
}

@group(0) @binding(0) var<storage, read> base: array<u32>;
@group(0) @binding(1) var<storage, read> adjusted: array<u32>;
@group(0) @binding(2) var<storage, read_write> dst: array<u32>;
@group(0) @binding(3) var<uniform> mask: MaskParams;

fn unpack(px: u32) -> vec4<f32> {
    return vec4<f32>(
        f32(px & 255u),
        f32((px >> 8u) & 255u),
        f32((px >> 16u) & 255u),
        f32((px >> 24u) & 255u)
    );
}

fn pack(px: vec4<f32>) -> u32 {
    let q = vec4<u32>(floor(clamp(px, vec4<f32>(0.0), vec4<f32>(255.0)) + 0.5));
    return q.x | (q.y << 8u) | (q.z << 16u) | (q.w << 24u);
}

fn coverage(p: vec2<f32>) -> f32 {
    var c = 0.0;
    if mask.dims.z == 0u {
        let start = mask.shape.xy;
        let d = mask.shape.zw - start;
        let len_sq = dot(d, d);
        if len_sq <= 1e-6 {
            c = 1.0;
        } else {
            c = clamp(dot(p - start, d) / len_sq, 0.0, 1.0);
        }
    } else {
        let center = mask.shape.xy;
        let inner = mask.shape.z;
        let outer = mask.shape.w;
        let dist = distance(p, center);
        if outer <= inner {
            c = select(0.0, 1.0, dist <= inner);
        } else {
            c = clamp(1.0 - (dist - inner) / (outer - inner), 0.0, 1.0);
        }
    }
    if mask.dims.w != 0u { c = 1.0 - c; }
    return clamp(c * mask.params.x, 0.0, 1.0);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let x = id.x;
    let y = id.y;
    if x >= mask.dims.x || y >= mask.dims.y { return; }

    let i = y * mask.dims.x + x;
    let p = vec2<f32>(f32(x) + 0.5, f32(y) + 0.5);
    let c = coverage(p);

    dst[i] = pack(mix(unpack(base[i]), unpack(adjusted[i]), c));
}
"#;
