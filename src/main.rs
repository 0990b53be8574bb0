mod app;

use std::env;

use softrender::pipeline::{LightingModel, Pipeline};
use softrender::scene::Scene;

const DEFAULT_WIDTH: u32 = 800;
const DEFAULT_HEIGHT: u32 = 800;
const DEFAULT_SSAA_FACTOR: u32 = 2;

struct Params {
    width: u32,
    height: u32,
    ssaa_factor: u32,
    asset_path: String,
    lighting: LightingModel,
    output_path: String,
    display: bool,
}

#[show_image::main]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Default values.
    let mut asset_path = String::from("assets/diablo");
    let mut shader_name = String::from("phong");
    let mut width = DEFAULT_WIDTH;
    let mut height = DEFAULT_HEIGHT;
    let mut ssaa_factor = DEFAULT_SSAA_FACTOR;
    let mut output_path = String::from("output.png");
    let mut display = false;

    let args: Vec<String> = env::args().collect();
    for i in 1..args.len() {
        match args[i].as_str() {
            "-p" => { asset_path = args[i + 1].clone(); }
            "-s" => { shader_name = args[i + 1].clone(); }
            "-w" => { width = args[i + 1].parse()?; }
            "-h" => { height = args[i + 1].parse()?; }
            "-a" => { ssaa_factor = args[i + 1].parse()?; }
            "-o" => { output_path = args[i + 1].clone(); }
            "-d" => { display = true; }
            _ => ()
        }
    }

    let lighting = match shader_name.as_str() {
        "phong" => LightingModel::BlinnPhong,
        "pbr" => LightingModel::Pbr,
        other => return Err(format!("unknown shader '{}', expected phong or pbr", other).into()),
    };

    let params = Params {
        width,
        height,
        ssaa_factor,
        asset_path,
        lighting,
        output_path,
        display,
    };

    run(params)?;

    return Ok(());
}

fn run(params: Params) -> Result<(), Box<dyn std::error::Error>> {
    let aspect_ratio = params.width as f32 / params.height as f32;
    let scene = Scene::load(&params.asset_path, aspect_ratio)?;

    let mut pipeline = Pipeline::new(
        params.width,
        params.height,
        params.ssaa_factor,
        params.lighting,
    );
    pipeline.preconfigure(&scene);
    pipeline.do_shadow_pass(&scene);
    pipeline.do_geometry_pass(&scene);
    pipeline.do_lighting_pass(&scene);
    pipeline.do_ssaa();

    let data = pipeline.output().as_rgb8_data();
    image::save_buffer(
        &params.output_path,
        &data,
        params.width,
        params.height,
        image::ColorType::Rgb8,
    )?;
    log::info!("wrote {}", params.output_path);

    if params.display {
        app::display(params.width, params.height, &data)?;
    }

    return Ok(());
}
