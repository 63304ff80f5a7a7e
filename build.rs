/// Compiles the triangle's GLSL stages in `shaders/` into SPIR-V bytecode. The renderer embeds the
/// results with `include_bytes!` from `SHADER_OUT_DIR`, so nothing is read from disk at runtime.
use std::{env, error::Error, fs, path::Path};

use shaderc::{CompileOptions, Compiler, OptimizationLevel, ShaderKind};

const SHADER_DIR: &str = "shaders";

fn main() -> Result<(), Box<dyn Error>> {
    let out_dir = env::var("OUT_DIR")?;
    println!("cargo:rustc-env=SHADER_OUT_DIR={out_dir}");

    compile_shaders(Path::new(&out_dir))?;

    println!("cargo:rerun-if-changed={SHADER_DIR}");

    Ok(())
}

/// Maps `name.vert.glsl` / `name.frag.glsl` to the stage shaderc should compile for. The triangle
/// pipeline only has these two stages.
fn shader_kind(filename: &str) -> Option<ShaderKind> {
    if filename.ends_with(".vert.glsl") {
        Some(ShaderKind::Vertex)
    } else if filename.ends_with(".frag.glsl") {
        Some(ShaderKind::Fragment)
    } else {
        None
    }
}

/// Compiles every `.glsl` file in `shaders/` to a `.spv` file of the same base name in `out_dir`.
fn compile_shaders(out_dir: &Path) -> Result<(), Box<dyn Error>> {
    let compiler = Compiler::new().expect("failed to initialize shaderc compiler");
    let mut options = CompileOptions::new().expect("failed to create shaderc compile options");

    // Release builds get optimized SPIR-V, everything else keeps it readable for debugging.
    match env::var("PROFILE").as_deref() {
        Ok("release") => options.set_optimization_level(OptimizationLevel::Performance),
        _ => options.set_optimization_level(OptimizationLevel::Zero),
    }

    for entry in fs::read_dir(SHADER_DIR)? {
        let path = entry?.path();

        if path.extension().and_then(|s| s.to_str()) != Some("glsl") {
            continue;
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| format!("shader path '{}' has no file name", path.display()))?;

        let kind = shader_kind(&filename).ok_or_else(|| {
            format!("unsupported shader stage for '{filename}', expected .vert.glsl or .frag.glsl")
        })?;

        let source = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read shader '{filename}': {e}"))?;

        let artifact =
            compiler.compile_into_spirv(&source, kind, &filename, "main", Some(&options))?;

        let spv_name = filename.replace(".glsl", ".spv");
        fs::write(out_dir.join(&spv_name), artifact.as_binary_u8())?;

        println!("cargo:rerun-if-changed={}", path.display());
    }

    Ok(())
}
