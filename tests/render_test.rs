#![cfg(feature = "integration-tests")]

use arjesus::{
    config::ViewerConfig,
    context::Context,
    data_structures::depth_texture::{DepthTexture, Rg8Upload, TextureStore, WgpuTextureStore},
    depth::{DepthFrame, DepthImagePool},
    flow::apply_asset_overrides,
    render::GltfViewer,
    viewer::ModelViewer,
};

use crate::common::test_utils::triangle_glb;

mod common;

const SIZE: u32 = 64;

async fn viewer() -> GltfViewer {
    arjesus::init();
    let ctx = Context::headless(SIZE, SIZE).await.unwrap();
    let mut viewer = GltfViewer::new(ctx, &ViewerConfig::default());
    viewer.set_skybox_colour([0.0, 0.0, 1.0, 1.0]);
    viewer
}

#[tokio::test]
async fn should_render_the_skybox_colour_everywhere_without_a_model() {
    let mut viewer = viewer().await;
    viewer.render(0).unwrap();
    let image = viewer.context().read_offscreen().await.unwrap();

    let first = *image.get_pixel(0, 0);
    assert!(first[2] > 200 && first[0] < 10 && first[1] < 10, "{first:?}");
    for pixel in image.pixels() {
        assert_eq!(*pixel, first);
    }
    assert_eq!(viewer.frames(), 1);
}

#[tokio::test]
async fn should_draw_the_fitted_model_in_front_of_the_skybox() {
    let mut viewer = viewer().await;
    viewer.load_model_glb(&triangle_glb()).unwrap();
    if let Some(asset) = viewer.asset() {
        apply_asset_overrides(asset, &ViewerConfig::default());
    }
    viewer.transform_to_unit_cube();
    viewer.render(0).unwrap();
    let image = viewer.context().read_offscreen().await.unwrap();

    let sky = *image.get_pixel(0, 0);
    // (-0.5, -0.25) on the fitted triangle, 4.5 units in front of the camera
    let model = *image.get_pixel(23, 36);
    assert_ne!(model, sky);
    // the right half above the hypotenuse stays empty
    assert_eq!(*image.get_pixel(48, 20), sky);
}

#[tokio::test]
async fn should_survive_unloading_the_model() {
    let mut viewer = viewer().await;
    viewer.load_model_glb(&triangle_glb()).unwrap();
    viewer.render(0).unwrap();
    viewer.unload_model();
    assert!(viewer.model().is_none());
    viewer.render(16_000_000).unwrap();
    assert_eq!(viewer.frames(), 2);
}

#[tokio::test]
async fn should_mirror_depth_frames_into_a_gpu_texture() {
    let ctx = Context::headless(SIZE, SIZE).await.unwrap();
    let mut store = WgpuTextureStore::new(&ctx.device, &ctx.queue);
    let mut pool = DepthImagePool::new(2);
    let mut depth = DepthTexture::new();
    depth.create(&mut store).unwrap();
    let id = depth.texture_id().unwrap();
    assert!(store.sampler(id).is_some());
    assert!(store.texture(id).is_none());

    pool.publish(DepthFrame::from_millimetres(160, 120, &vec![1500; 160 * 120]).unwrap());
    depth.update(&mut store, &mut pool).unwrap();
    let texture = store.texture(id).unwrap();
    assert_eq!((texture.width(), texture.height()), (160, 120));
    assert_eq!(texture.format(), WgpuTextureStore::FORMAT);

    depth.destroy(&mut store);
    assert!(store.texture(id).is_none());
}

#[tokio::test]
async fn short_uploads_keep_the_previous_gpu_texture() {
    let ctx = Context::headless(SIZE, SIZE).await.unwrap();
    let mut store = WgpuTextureStore::new(&ctx.device, &ctx.queue);
    let mut pool = DepthImagePool::new(1);
    let mut depth = DepthTexture::new();
    depth.create(&mut store).unwrap();
    let id = depth.texture_id().unwrap();
    pool.publish(DepthFrame::from_millimetres(160, 120, &vec![800; 160 * 120]).unwrap());
    depth.update(&mut store, &mut pool).unwrap();

    let short = Rg8Upload {
        width: 10,
        height: 10,
        bytes_per_row: 20,
        bytes: &[0; 50],
    };
    assert!(store.upload_rg8(id, short).is_err());
    let texture = store.texture(id).unwrap();
    assert_eq!((texture.width(), texture.height()), (160, 120));
}
