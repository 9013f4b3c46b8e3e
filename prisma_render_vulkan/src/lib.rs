/*!
# Prisma Render - Vulkan Backend

Vulkan implementation of the `prisma_render` graphics device.

`VulkanGraphicsDevice` implements `GraphicsDevice` and hands out
`VulkanCommandList`s implementing `CommandList`, using ash for the Vulkan
bindings and gpu-allocator for memory management. Everything above the device
seam (passes, pipelines, the frame loop) comes from `prisma_render` unchanged.

```no_run
use prisma_render::prisma::{Renderer, RendererConfig};
use prisma_render::prisma::resource::ResourceManager;
use prisma_render_vulkan::{VulkanConfig, VulkanGraphicsDevice};
# fn run(window: &winit::window::Window, resources: ResourceManager) -> prisma_render::prisma::Result<()> {
let config = RendererConfig::default();
let device = VulkanGraphicsDevice::new(window, &config, VulkanConfig::default())?;
let mut renderer = Renderer::new(Box::new(device), config, resources)?;
# Ok(())
# }
```
*/

mod debug;
mod vulkan;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_config;
mod vulkan_context;
mod vulkan_descriptor_set;
mod vulkan_format;
mod vulkan_pipeline;
mod vulkan_render_target;
mod vulkan_resources;
mod vulkan_sampler;
mod vulkan_shader;
mod vulkan_swapchain;
mod vulkan_texture;

pub use vulkan::VulkanGraphicsDevice;
pub use vulkan_command_list::VulkanCommandList;
pub use vulkan_config::{VulkanConfig, ValidationSeverity};

// Validation layer bookkeeping
pub use debug::{validation_stats, print_validation_stats_report, ValidationStats};
