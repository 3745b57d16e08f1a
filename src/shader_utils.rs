//! WGSL snippets shared by the pipeline stages.
//!
//! Each stage generates its shader with `format!`, splicing in what it
//! needs from here.
//!
//! # Available Functions
//!
//! ## Random & Hash
//! - `hash(n: u32) -> u32` - Hash a u32 to pseudo-random u32
//! - `next_random(state: ptr<function, u32>) -> f32` - Advance a hash
//!   state and return a float in [0, 1)
//!
//! ## Geodesy
//! - `geodetic_to_ecef(lon: f32, lat: f32, height: f32) -> vec3<f32>` -
//!   WGS84 earth-centred coordinates in metres
//!
//! ## Full-screen pass
//! - `vs_main(vertex_index)` - one oversized triangle covering the viewport,
//!   with `uv` in [0, 1] (v pointing down)

/// Mean equatorial radius used to turn metres into degrees.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = 6.694_379_990_14e-3;

/// WGSL code for random/hash functions.
pub const RANDOM_WGSL: &str = r#"
// Hash functions for pseudo-random number generation
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

// Random float in [0, 1), 24 bits of the advanced state
fn next_random(state: ptr<function, u32>) -> f32 {
    *state = hash(*state);
    return f32(*state >> 8u) / 16777216.0;
}
"#;

/// WGSL geodesy constants and conversion.
pub fn geo_wgsl() -> String {
    format!(
        r#"
const EARTH_RADIUS: f32 = {radius:.1};
const WGS84_E2: f32 = {e2:e};

fn geodetic_to_ecef(lon_deg: f32, lat_deg: f32, height: f32) -> vec3<f32> {{
    let lon = radians(lon_deg);
    let lat = radians(lat_deg);
    let sin_lat = sin(lat);
    let n = EARTH_RADIUS / sqrt(1.0 - WGS84_E2 * sin_lat * sin_lat);
    return vec3<f32>(
        (n + height) * cos(lat) * cos(lon),
        (n + height) * cos(lat) * sin(lon),
        (n * (1.0 - WGS84_E2) + height) * sin_lat
    );
}}
"#,
        radius = EARTH_RADIUS,
        e2 = WGS84_E2,
    )
}

/// Full-screen triangle vertex stage.
pub const FULLSCREEN_WGSL: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    var uvs = array<vec2<f32>, 3>(
        vec2<f32>(0.0, 1.0),
        vec2<f32>(2.0, 1.0),
        vec2<f32>(0.0, -1.0),
    );

    var out: VertexOutput;
    out.clip_position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    out.uv = uvs[vertex_index];
    return out;
}
"#;

/// Parse and validate a complete WGSL module.
#[cfg(test)]
pub(crate) fn validate_wgsl(code: &str) -> Result<(), String> {
    let module = naga::front::wgsl::parse_str(code).map_err(|e| format!("Parse error: {:?}", e))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("Validation error: {:?}", e))?;

    Ok(())
}
