//! End-to-end tests for rendering encoded tiles through a RenderContext.

use pyramid::{
    ArrayRef, ArrayTile, InMemoryArray, PyramidError, RasterArray, RenderConfig, RenderContext,
    RenderParams, ValidRange, Variable,
};
use renderer::{ImageFormat, TRANSPARENT};
use std::sync::Arc;
use std::thread;
use test_utils::{
    assert_uniform_rgba, cell_centers, create_constant_grid, create_gradient_grid, scratch_dir,
};
use tile_common::PixelRect;

const WIDTH: usize = 16;
const HEIGHT: usize = 8;

fn config() -> RenderConfig {
    RenderConfig {
        preferred_tile_size: Some(4),
        ..Default::default()
    }
}

fn variable(name: &str, data: Vec<f32>) -> Variable {
    dataset_variable("ds", name, data)
}

fn dataset_variable(dataset_id: &str, name: &str, data: Vec<f32>) -> Variable {
    let array: ArrayRef = Arc::new(InMemoryArray::from_2d(WIDTH, HEIGHT, data).unwrap());
    Variable::new(
        dataset_id,
        name,
        array,
        cell_centers(-180.0, 180.0, WIDTH),
        cell_centers(-90.0, 90.0, HEIGHT),
    )
}

fn params(min: f64, max: f64) -> RenderParams {
    RenderParams {
        color_ramp: Some("viridis".to_string()),
        value_min: Some(min),
        value_max: Some(max),
        ..Default::default()
    }
}

fn decode(png: &[u8]) -> image::RgbaImage {
    image::load_from_memory(png).unwrap().to_rgba8()
}

#[test]
fn test_constant_tile_maps_to_ramp_color() {
    let context = RenderContext::new(config()).unwrap();
    let var = variable("t", create_constant_grid(WIDTH, HEIGHT, 2.5));

    let png = context.get_tile(&var, &params(0.0, 10.0), 1, 0, 1).unwrap();
    assert_eq!(ImageFormat::sniff(&png), Some(ImageFormat::Png));

    let expected = context.color_ramps().get("viridis").unwrap().color_at(0.25);
    let decoded = decode(&png);
    assert_eq!(decoded.dimensions(), (4, 4));
    assert_uniform_rgba!(decoded.as_raw(), expected);
}

#[test]
fn test_masked_cells_are_transparent() {
    let context = RenderContext::new(config()).unwrap();
    let mut data = create_constant_grid(WIDTH, HEIGHT, 5.0);
    for row in 0..HEIGHT {
        data[row * WIDTH] = -999.0;
    }
    let var = variable("t", data).with_no_data(Some(-999.0));

    let decoded = decode(&context.get_tile(&var, &params(0.0, 10.0), 0, 1, 1).unwrap());
    let color = context.color_ramps().get("viridis").unwrap().color_at(0.5);
    for row in 0..4 {
        assert_eq!(decoded.get_pixel(0, row).0, TRANSPARENT);
        assert_eq!(decoded.get_pixel(1, row).0, color);
    }
}

#[test]
fn test_valid_range_masks_outliers() {
    let context = RenderContext::new(config()).unwrap();
    let var = variable("t", create_constant_grid(WIDTH, HEIGHT, 50.0))
        .with_valid_range(Some(ValidRange::new(None, Some(10.0))));

    let decoded = decode(&context.get_tile(&var, &params(0.0, 10.0), 0, 0, 0).unwrap());
    assert_uniform_rgba!(decoded.as_raw(), TRANSPARENT);
}

#[test]
fn test_ascending_latitudes_are_flipped_north_up() {
    let context = RenderContext::new(config()).unwrap();
    // value = row index; row 0 is the southernmost
    let data: Vec<f32> = (0..HEIGHT)
        .flat_map(|row| std::iter::repeat(row as f32).take(WIDTH))
        .collect();
    let var = variable("lat", data);
    assert!(context.tile_grid(&var).unwrap().inv_y);

    let decoded = decode(&context.get_tile(&var, &params(0.0, 7.0), 0, 0, 1).unwrap());
    let ramp = context.color_ramps().get("viridis").unwrap();
    // Top tile row shows the northernmost row first
    assert_eq!(decoded.get_pixel(0, 0).0, ramp.color_at(1.0));
    assert_eq!(decoded.get_pixel(0, 3).0, ramp.color_at(4.0 / 7.0));
}

#[test]
fn test_nan_range_resolves_from_data() {
    let context = RenderContext::new(config()).unwrap();
    let var = variable("g", create_gradient_grid(WIDTH, HEIGHT, 10.0, 20.0));

    let auto = context
        .get_tile(&var, &params(f64::NAN, f64::NAN), 1, 0, 1)
        .unwrap();
    let explicit = context.get_tile(&var, &params(10.0, 20.0), 1, 0, 1).unwrap();
    assert_eq!(auto, explicit);
    assert_eq!(context.stats().num_pyramids, 2);
}

#[test]
fn test_repeated_requests_hit_memory_cache() {
    let context = RenderContext::new(config()).unwrap();
    let var = variable("t", create_gradient_grid(WIDTH, HEIGHT, 0.0, 1.0));
    let params = params(0.0, 1.0);

    let first = context.get_tile(&var, &params, 2, 1, 1).unwrap();
    let second = context.get_tile(&var, &params, 2, 1, 1).unwrap();
    assert_eq!(first, second);

    let stats = context.stats();
    assert_eq!(stats.num_pyramids, 1);
    assert_eq!(stats.num_tile_grids, 1);
    assert!(stats.file_cache.is_none());
    // rgb tiles are not cached without a file cache, tra tiles are
    assert_eq!(stats.mem_cache.hits, 1);
    assert_eq!(stats.mem_cache.entry_count, 1);
}

#[test]
fn test_file_cache_survives_context() {
    let dir = scratch_dir();
    let config = RenderConfig {
        file_tile_cache_enabled: true,
        file_tile_cache_path: dir.path().to_path_buf(),
        ..config()
    };
    let var = variable("t", create_gradient_grid(WIDTH, HEIGHT, 0.0, 1.0));

    let first = {
        let context = RenderContext::new(config.clone()).unwrap();
        let png = context.get_tile(&var, &params(0.0, 1.0), 0, 0, 0).unwrap();
        assert_eq!(context.file_cache().unwrap().len(), 1);
        png
    };
    assert!(dir.path().join("tiles").is_dir());

    let context = RenderContext::new(config).unwrap();
    let second = context.get_tile(&var, &params(0.0, 1.0), 0, 0, 0).unwrap();
    assert_eq!(first, second);
    assert_eq!(context.file_cache().unwrap().stats().hits, 1);
    // Served from disk without computing array tiles
    assert!(context.mem_cache().is_empty());
}

#[test]
fn test_evict_pyramid_purges_caches() {
    let context = RenderContext::new(config()).unwrap();
    let var = variable("t", create_gradient_grid(WIDTH, HEIGHT, 0.0, 1.0));
    let params = params(0.0, 1.0);

    context.get_or_create_pyramid(&var, &params).unwrap().prefetch_level(1).unwrap();
    assert_eq!(context.mem_cache().len(), 8);

    let image_id = context.image_id(&var, &params);
    assert_eq!(image_id, "ds-t--viridis-0-1");
    assert!(context.evict_pyramid(&image_id));
    assert!(!context.evict_pyramid(&image_id));
    assert!(context.mem_cache().is_empty());
    assert_eq!(context.stats().num_pyramids, 0);
}

#[test]
fn test_evict_dataset_and_clear() {
    let context = RenderContext::new(config()).unwrap();
    let a = variable("a", create_constant_grid(WIDTH, HEIGHT, 0.5));
    let b = variable("b", create_constant_grid(WIDTH, HEIGHT, 0.5));
    context.get_tile(&a, &params(0.0, 1.0), 0, 0, 0).unwrap();
    context.get_tile(&b, &params(0.0, 1.0), 0, 0, 0).unwrap();
    context.get_tile(&b, &params(0.0, 2.0), 0, 0, 0).unwrap();

    assert_eq!(context.evict_dataset("other"), 0);
    assert_eq!(context.evict_dataset("ds"), 3);
    assert_eq!(context.stats().num_tile_grids, 0);

    context.get_tile(&a, &params(0.0, 1.0), 0, 0, 0).unwrap();
    context.clear();
    let stats = context.stats();
    assert_eq!(stats.num_pyramids, 0);
    assert_eq!(stats.mem_cache.entry_count, 0);
}

#[test]
fn test_hyphenated_names_do_not_share_tiles() {
    let context = RenderContext::new(config()).unwrap();
    let a = dataset_variable("a-b", "c", create_constant_grid(WIDTH, HEIGHT, 1.0));
    let b = dataset_variable("a", "b-c", create_constant_grid(WIDTH, HEIGHT, 0.0));

    assert_ne!(context.image_id(&a, &params(0.0, 1.0)), context.image_id(&b, &params(0.0, 1.0)));
    assert_eq!(context.array_id(&a, &params(0.0, 1.0)), "a%2Db-c-");

    let tile_a = context.get_tile(&a, &params(0.0, 1.0), 0, 0, 0).unwrap();
    let tile_b = context.get_tile(&b, &params(0.0, 1.0), 0, 0, 0).unwrap();
    assert_ne!(tile_a, tile_b);
    assert_eq!(context.stats().num_pyramids, 2);
}

#[test]
fn test_evict_dataset_matches_exact_id() {
    let context = RenderContext::new(config()).unwrap();
    let a = dataset_variable("a", "t", create_constant_grid(WIDTH, HEIGHT, 0.5));
    let ab = dataset_variable("a-b", "t", create_constant_grid(WIDTH, HEIGHT, 0.5));
    context.get_tile(&a, &params(0.0, 1.0), 0, 0, 0).unwrap();
    context.get_tile(&ab, &params(0.0, 1.0), 0, 0, 0).unwrap();

    assert_eq!(context.evict_dataset("a"), 1);
    let stats = context.stats();
    assert_eq!(stats.num_pyramids, 1);
    assert_eq!(stats.num_tile_grids, 1);
    assert!(context.evict_pyramid(&context.image_id(&ab, &params(0.0, 1.0))));
}

#[test]
fn test_pyramid_key_fills_defaults() {
    let context = RenderContext::new(config()).unwrap();
    let var = variable("t", create_constant_grid(WIDTH, HEIGHT, 0.0));
    let defaults = context.pyramid_key(&var, &RenderParams::default());
    let config = context.config();
    let explicit = context.pyramid_key(
        &var,
        &RenderParams {
            color_ramp: Some(config.default_color_ramp.clone()),
            value_min: Some(config.default_value_min),
            value_max: Some(config.default_value_max),
            ..Default::default()
        },
    );
    assert_eq!(defaults, explicit);

    let nan = context.pyramid_key(&var, &params(f64::NAN, 1.0));
    assert_eq!(nan, context.pyramid_key(&var, &params(f64::NAN, 1.0)));
    assert!(nan.value_min().is_nan());
}

#[test]
fn test_leading_indices_select_plane() {
    let context = RenderContext::new(config()).unwrap();
    let mut data = create_constant_grid(WIDTH, HEIGHT, 0.0);
    data.extend(create_constant_grid(WIDTH, HEIGHT, 5.0));
    let array: ArrayRef = Arc::new(InMemoryArray::new(vec![2, HEIGHT, WIDTH], data).unwrap());
    let var = Variable::new(
        "ds",
        "t",
        array,
        cell_centers(-180.0, 180.0, WIDTH),
        cell_centers(90.0, -90.0, HEIGHT),
    );

    let params = RenderParams {
        leading_indices: vec![1],
        ..params(0.0, 10.0)
    };
    let decoded = decode(&context.get_tile(&var, &params, 0, 0, 0).unwrap());
    let expected = context.color_ramps().get("viridis").unwrap().color_at(0.5);
    assert_uniform_rgba!(decoded.as_raw(), expected);
    assert_eq!(context.array_id(&var, &params), "ds-t-1");

    let err = context
        .get_tile(&var, &RenderParams::default(), 0, 0, 0)
        .unwrap_err();
    assert!(matches!(err, PyramidError::LeadingIndices { expected: 1, actual: 0 }));
    assert_eq!(err.http_status_code(), 400);
}

#[test]
fn test_request_errors_are_client_errors() {
    struct Vector(Vec<usize>);

    impl RasterArray for Vector {
        fn shape(&self) -> &[usize] {
            &self.0
        }

        fn read_window(&self, _rect: PixelRect) -> pyramid::Result<ArrayTile> {
            Err(PyramidError::array_read("not an image"))
        }
    }

    let context = RenderContext::new(config()).unwrap();
    let vector = Variable::new("ds", "v", Arc::new(Vector(vec![WIDTH])), vec![], vec![]);
    let err = context.get_tile(&vector, &RenderParams::default(), 0, 0, 0).unwrap_err();
    assert!(matches!(err, PyramidError::InvalidDimensions { .. }));

    let var = variable("t", create_constant_grid(WIDTH, HEIGHT, 0.0));
    let unknown_ramp = RenderParams {
        color_ramp: Some("plaid".to_string()),
        ..Default::default()
    };
    let err = context.get_tile(&var, &unknown_ramp, 0, 0, 0).unwrap_err();
    assert_eq!(err.http_status_code(), 400);

    let err = context.get_tile(&var, &RenderParams::default(), 9, 0, 0).unwrap_err();
    assert!(matches!(err, PyramidError::TileOutOfRange { .. }));

    let err = context.tiling_scheme(&var, "kml", "tiles/{z}/{x}/{y}.png").unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn test_tiling_scheme_describes_grid() {
    let context = RenderContext::new(config()).unwrap();
    let var = variable("t", create_constant_grid(WIDTH, HEIGHT, 0.0));

    let doc = context
        .tiling_scheme(&var, "cesium.json", "tiles/{z}/{x}/{y}.png")
        .unwrap();
    assert_eq!(doc["tileWidth"], 4);
    assert_eq!(doc["maximumLevel"], 1);

    let doc = context.tiling_scheme(&var, "ol4", "tiles/{z}/{x}/{y}.png").unwrap();
    assert_eq!(doc["url"], "tiles/{z}/{x}/{y}.png");
}

#[test]
fn test_concurrent_requests_share_pyramid() {
    let context = Arc::new(RenderContext::new(config()).unwrap());
    let var = variable("t", create_gradient_grid(WIDTH, HEIGHT, 0.0, 1.0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let context = context.clone();
            let var = var.clone();
            thread::spawn(move || context.get_tile(&var, &params(0.0, 1.0), i % 4, 1, 1).unwrap())
        })
        .collect();
    let tiles: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for i in 0..4 {
        assert_eq!(tiles[i], tiles[i + 4]);
    }
    assert_eq!(context.stats().num_pyramids, 1);
    assert_eq!(context.mem_cache().len(), 4);
}
